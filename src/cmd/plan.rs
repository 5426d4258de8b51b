use anyhow::Result;
use tracing::info;

use crate::{
    atry,
    cli::PlanOutputFormat,
    core::{
        graph::{PublishPlan, SolutionGraph},
        session::AppSession,
    },
    utils::theme::{dimmed, header, highlight, pointer_icon},
};

pub fn run(sess: &mut AppSession, format: PlanOutputFormat) -> Result<i32> {
    info!(
        "computing publish order for {} solution(s)",
        sess.solutions().len()
    );

    let plan = atry!(
        SolutionGraph::build(sess.solutions_mut());
        ["could not compute a publish plan"]
    );

    match format {
        PlanOutputFormat::Text => render_text(&plan),
        PlanOutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    Ok(0)
}

fn render_text(plan: &PublishPlan) {
    println!("{}", header("Publish order"));

    for (i, step) in plan.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, highlight(&step.solution));

        if !step.publishes.is_empty() {
            println!("     {}", dimmed(&format!("publishes {}", step.publishes.join(", "))));
        }

        for provider in &step.depends_on {
            println!("     {} after {}", pointer_icon(), provider);
        }
    }

    println!();
}
