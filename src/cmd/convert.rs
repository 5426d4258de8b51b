use anyhow::Result;

use crate::{
    atry,
    core::{session::AppSession, storage::StorageMode},
    utils::theme::{highlight, success_message},
};

/// Rewrite each solution's dependency files for another layout. Solutions
/// already using `mode` are left alone.
pub fn run(sess: &mut AppSession, mode: StorageMode) -> Result<i32> {
    for solution in sess.solutions_mut() {
        if solution.mode() == mode {
            println!(
                "{}",
                success_message(&format!("{} already uses the {} layout", solution.name(), mode))
            );
            continue;
        }

        solution.assert_no_locked_files()?;
        solution.convert_to(mode)?;

        atry!(
            solution.save();
            ["failed to write solution `{}` in the {} layout", solution.name(), mode]
        );

        println!(
            "{}",
            success_message(&format!("Converted {} to {}", solution.name(), highlight(mode.as_str())))
        );
    }

    Ok(0)
}
