//! Final run summary: per-environment status lines and the exit-code rollup.

use std::time::Instant;

use owo_colors::OwoColorize;

use envoke_process::Outcome;

use crate::run_one::RunResult;

/// Print the summary, ordered as the results are (input environment order),
/// and compute the process exit code.
pub fn report(start: Instant, results: &[RunResult], colored: bool) -> i32 {
    let mut all_ok = true;
    for run in results {
        let ok = run.code == Outcome::OK;
        let line = env_line(run);
        if !colored {
            println!("{line}");
        } else if ok && run.skipped {
            println!("{}", line.yellow());
        } else if ok {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
        all_ok &= ok;
    }

    let total = start.elapsed().as_secs_f64();
    if all_ok {
        let line = format!("  congratulations :) ({total:.2} seconds)");
        if colored {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
        Outcome::OK
    } else {
        let line = format!("  evaluation failed :( ({total:.2} seconds)");
        if colored {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
        rollup_code(results)
    }
}

/// Exit code when at least one environment failed: a single-env run
/// propagates its exact code, anything else collapses to 1.
fn rollup_code(results: &[RunResult]) -> i32 {
    if results.len() == 1 { results[0].code } else { 1 }
}

/// One summary line, e.g. `  py: OK (1.23=setup[0.12]+cmd[1.11] seconds)`.
fn env_line(run: &RunResult) -> String {
    let ok = run.code == Outcome::OK;
    let msg = if ok {
        if run.skipped { "SKIP".to_string() } else { "OK".to_string() }
    } else {
        format!("FAIL code {}", run.code)
    };

    // test commands get their own bracket; setup command time stays in the
    // setup figure together with the preparation gaps
    let cmd_durations: Vec<f64> = run
        .outcomes
        .iter()
        .filter(|outcome| !outcome.request.run_id.starts_with("setup"))
        .map(|outcome| outcome.elapsed().as_secs_f64())
        .collect();
    let total = run.duration.as_secs_f64();
    let timing = if cmd_durations.is_empty() {
        format!("{total:.2} seconds")
    } else {
        let setup = (total - cmd_durations.iter().sum::<f64>()).max(0.0);
        let cmds = cmd_durations
            .iter()
            .map(|elapsed| format!("{elapsed:.2}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{total:.2}=setup[{setup:.2}]+cmd[{cmds}] seconds")
    };
    format!("  {}: {} ({})", run.name, msg, timing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoke_process::ExecuteRequest;
    use std::collections::HashMap;
    use std::time::Duration;

    fn run(name: &str, code: i32, skipped: bool) -> RunResult {
        RunResult {
            name: name.to_string(),
            skipped,
            code,
            outcomes: Vec::new(),
            duration: Duration::from_millis(1500),
        }
    }

    fn with_outcome(mut run: RunResult, run_id: &str, elapsed: Duration) -> RunResult {
        let request = ExecuteRequest::new(vec!["true".into()], "/tmp", HashMap::new(), run_id);
        let start = Instant::now();
        run.outcomes.push(Outcome::new(
            request,
            Some(0),
            String::new(),
            String::new(),
            start,
            start + elapsed,
            vec!["true".into()],
        ));
        run
    }

    #[test]
    fn ok_line_without_commands() {
        assert_eq!(env_line(&run("a", 0, false)), "  a: OK (1.50 seconds)");
    }

    #[test]
    fn skip_line() {
        assert_eq!(env_line(&run("a", 0, true)), "  a: SKIP (1.50 seconds)");
    }

    #[test]
    fn fail_line_carries_the_code() {
        assert_eq!(
            env_line(&run("a", 3, false)),
            "  a: FAIL code 3 (1.50 seconds)"
        );
    }

    #[test]
    fn line_with_commands_splits_setup_and_cmd() {
        let line = env_line(&with_outcome(
            run("a", 0, false),
            "commands[0]",
            Duration::ZERO,
        ));
        assert!(line.starts_with("  a: OK (1.50=setup["), "{line}");
        assert!(line.contains("]+cmd[0.00]"), "{line}");
    }

    #[test]
    fn setup_durations_stay_out_of_the_cmd_bracket() {
        // duration 1.5s: a 0.5s setup step and a 1.0s test command
        let run = with_outcome(
            with_outcome(run("a", 0, false), "setup[0]", Duration::from_millis(500)),
            "commands[0]",
            Duration::from_millis(1000),
        );
        let line = env_line(&run);
        assert!(line.contains("=setup[0.50]+cmd[1.00]"), "{line}");
    }

    #[test]
    fn setup_only_env_reports_plain_timing() {
        let run = with_outcome(run("a", 3, false), "setup[0]", Duration::from_millis(500));
        assert_eq!(env_line(&run), "  a: FAIL code 3 (1.50 seconds)");
    }

    #[test]
    fn all_ok_exits_zero() {
        let results = vec![run("a", 0, false), run("b", 0, true)];
        assert_eq!(report(Instant::now(), &results, false), 0);
    }

    #[test]
    fn single_env_failure_propagates_its_code() {
        let results = vec![run("a", 7, false)];
        assert_eq!(report(Instant::now(), &results, false), 7);
    }

    #[test]
    fn multi_env_failure_collapses_to_one() {
        let results = vec![run("a", 7, false), run("b", 0, false)];
        assert_eq!(report(Instant::now(), &results, false), 1);
    }

    #[test]
    fn interrupt_sentinels_are_failures() {
        let results = vec![run("a", -2, false), run("b", -3, false)];
        assert_eq!(report(Instant::now(), &results, false), 1);
    }
}
