mod common;

use common::{stderr, TestWorkspace};

#[test]
fn test_convert_round_trip() {
    let ws = TestWorkspace::new();
    ws.write_solution(
        "fubu",
        "",
        &[
            ("App", &["FubuCore, 1.2.0, float", "Bottles, 2.0.0, fixed"]),
            ("Tests", &["NUnit, 2.6.0, fixed"]),
        ],
    );

    let output = ws.run_ripple_command_in("fubu", &["convert", "--mode", "classic"]);
    assert!(output.status.success(), "convert failed: {}", stderr(&output));

    assert!(!ws.file_exists("fubu/App/ripple.dependencies.config"));
    assert!(ws.file_exists("fubu/App/packages.config"));
    assert!(ws.file_exists("fubu/Tests/packages.config"));

    let config = ws.read_file("fubu/App/packages.config");
    assert!(config.contains(r#"id="FubuCore""#), "unexpected config: {}", config);
    assert!(config.contains(r#"version="2.0.0""#), "unexpected config: {}", config);
    assert!(ws.read_file("fubu/ripple.toml").contains(r#"mode = "classic""#));

    let output = ws.run_ripple_command_in("fubu", &["missing"]);
    assert!(output.status.success(), "missing failed: {}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("NUnit"));

    let output = ws.run_ripple_command_in("fubu", &["convert", "--mode", "ripple"]);
    assert!(output.status.success(), "convert failed: {}", stderr(&output));

    assert!(!ws.file_exists("fubu/App/packages.config"));

    let deps = ws.read_file("fubu/App/ripple.dependencies.config");
    // packages.config has no notion of update modes; everything comes back fixed.
    assert!(deps.contains("FubuCore,1.2.0,fixed"), "unexpected deps: {}", deps);
    assert!(deps.contains("Bottles,2.0.0,fixed"), "unexpected deps: {}", deps);
    assert!(ws.read_file("fubu/ripple.toml").contains(r#"mode = "ripple""#));
}

#[test]
fn test_convert_to_current_mode_is_a_no_op() {
    let ws = TestWorkspace::new();
    ws.write_solution("fubu", "", &[("App", &["FubuCore, 1.2.0, float"])]);

    let output = ws.run_ripple_command_in("fubu", &["convert", "--mode", "ripple"]);
    assert!(output.status.success(), "convert failed: {}", stderr(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("already uses the ripple layout"));
    assert!(ws.file_exists("fubu/App/ripple.dependencies.config"));
}
