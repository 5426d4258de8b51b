use anyhow::Result;
use tracing::info;

use crate::{
    core::{session::AppSession, storage::CleanMode},
    utils::theme::success_message,
};

pub fn run(sess: &mut AppSession, mode: CleanMode) -> Result<i32> {
    for solution in sess.solutions_mut() {
        info!("cleaning {} ({})", solution.name(), mode.as_str());
        solution.clean(mode)?;
        println!("{}", success_message(&format!("Cleaned {}", solution.name())));
    }

    Ok(0)
}
