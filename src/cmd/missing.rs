use anyhow::Result;

use crate::{
    core::session::AppSession,
    utils::theme::{dimmed, header, success_message, warning_message},
};

pub fn run(sess: &AppSession) -> Result<i32> {
    for solution in sess.solutions() {
        println!("{}", header(&format!("Missing packages in {}", solution.name())));

        let missing = solution.missing_nugets()?;

        if missing.is_empty() {
            println!("{}", success_message("Nothing is missing"));
            continue;
        }

        for dep in missing {
            let version = dep.version.as_deref().unwrap_or("any version");
            println!("{} {}", warning_message(&dep.name), dimmed(version));
        }
    }

    Ok(0)
}
