use anyhow::Result;
use tracing::info;

use crate::{
    core::session::AppSession,
    utils::theme::{error_message, header, success_message, warning_message},
};

/// Report dependency problems. Exits with 1 if any selected solution is
/// invalid.
pub fn run(sess: &AppSession) -> Result<i32> {
    let mut exit_code = 0;

    for solution in sess.solutions() {
        println!("{}", header(&format!("Validating {}", solution.name())));

        for conflict in solution.dependency_conflicts() {
            println!("{}", warning_message(&conflict.to_string()));
        }

        let result = solution.validate()?;
        info!("{}: {} problem(s)", solution.name(), result.len());

        if result.is_valid() {
            println!("{}", success_message(&format!("{} is valid", solution.name())));
            continue;
        }

        exit_code = 1;

        for problem in &result.problems {
            println!("{}", error_message(&problem.to_string()));
        }
    }

    Ok(exit_code)
}
