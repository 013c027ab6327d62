//! Session-level tests over a real CSV dataset.
//!
//! These drive `Session::run` across several invocations to verify resume
//! behavior: checkpointed results survive between runs and each mode selects
//! the right rows on the next run.

use enricher::core::selector::Mode;
use enricher::io::audit_log::AuditEntry;
use enricher::io::config::EnricherConfig;
use enricher::run_loop::{RunOutcome, RunStop};
use enricher::session::Session;
use enricher::test_support::{
    CsvFixture, MemoryAudit, RecordingWaiter, ScriptedTool, completed, failed, table,
};

fn config_for(fixture: &CsvFixture) -> EnricherConfig {
    EnricherConfig {
        dataset_path: fixture.path().to_path_buf(),
        quota_wait_secs: 0,
        task_interval_secs: 0,
        ..EnricherConfig::default()
    }
}

fn run_once(
    fixture: &CsvFixture,
    tool: &ScriptedTool,
    waiter: &RecordingWaiter,
    audit: &mut MemoryAudit,
    mode: Option<Mode>,
) -> RunOutcome {
    let config = config_for(fixture);
    let store = fixture.store();
    Session {
        config: &config,
        tool,
        waiter,
        store: &store,
        audit,
    }
    .run(mode, |_| Ok(Mode::Continue))
    .expect("run")
}

fn emails(fixture: &CsvFixture) -> Vec<String> {
    fixture
        .read()
        .expect("read dataset")
        .rows
        .into_iter()
        .map(|row| row[3].clone())
        .collect()
}

fn companies() -> CsvFixture {
    CsvFixture::new(&table(
        &["company_name", "company_name_tc", "region"],
        &[
            &["Alpha Ltd", "甲有限公司", "HK"],
            &["", "乙公司", "KLN"],
            &["", "", "NT"],
            &["Delta Co", "", "HK"],
        ],
    ))
    .expect("fixture")
}

/// Three-run lifecycle.
///
/// 1. Fresh run: Alpha found, 乙 not found, blank row skipped, Delta errors.
/// 2. Continue: only Delta (error sentinel) is re-selected and now succeeds.
/// 3. Retry-not-found: only 乙 is re-selected and now succeeds.
#[test]
fn resume_modes_select_the_right_rows_across_runs() {
    let fixture = companies();
    let mut audit = MemoryAudit::default();
    let waiter = RecordingWaiter::new();

    let tool = ScriptedTool::new(vec![
        completed("checking registry...\ninfo@alpha.hk\n"),
        completed("Not Found"),
        failed("unexpected argument"),
    ]);
    let first = run_once(&fixture, &tool, &waiter, &mut audit, None);
    assert_eq!(first.mode, Mode::Fresh);
    assert_eq!(first.stop, RunStop::Completed);
    assert_eq!(first.counters.success, 1);
    assert_eq!(first.counters.not_found, 1);
    assert_eq!(first.counters.skipped, 1);
    assert_eq!(first.counters.retryable, 1);
    assert_eq!(
        emails(&fixture),
        vec!["info@alpha.hk", "Not Found", "", "Error: Gemini call failed"]
    );

    let tool = ScriptedTool::new(vec![completed("sales@delta.com")]);
    let second = run_once(&fixture, &tool, &waiter, &mut audit, Some(Mode::Continue));
    assert_eq!(second.mode, Mode::Continue);
    // Blank row is re-selected but skipped again.
    assert_eq!(second.counters.selected, 2);
    assert_eq!(second.counters.success, 1);
    assert_eq!(tool.calls(), 1);
    assert!(tool.prompts()[0].contains("Delta Co"));

    let tool = ScriptedTool::new(vec![completed("hello@yi.hk")]);
    let third = run_once(&fixture, &tool, &waiter, &mut audit, Some(Mode::RetryNotFound));
    assert_eq!(third.counters.selected, 1);
    assert_eq!(third.counters.success, 1);
    assert_eq!(
        emails(&fixture),
        vec!["info@alpha.hk", "hello@yi.hk", "", "sales@delta.com"]
    );

    // Columns other than the result survive every rewrite.
    let saved = fixture.read().expect("read");
    assert_eq!(saved.headers, vec!["company_name", "company_name_tc", "region", "Email"]);
    assert_eq!(saved.rows[3][2], "HK");

    let not_found: Vec<&AuditEntry> = audit
        .entries()
        .iter()
        .filter(|entry| matches!(entry, AuditEntry::NotFound { .. }))
        .collect();
    assert_eq!(
        not_found,
        vec![&AuditEntry::NotFound {
            name: "乙公司".to_string()
        }]
    );
}

#[test]
fn restart_clears_results_and_reprocesses_everything() {
    let fixture = companies();
    let mut audit = MemoryAudit::default();
    let waiter = RecordingWaiter::new();

    let tool = ScriptedTool::new(vec![
        completed("a@alpha.hk"),
        completed("Not Found"),
        completed("d@delta.com"),
    ]);
    run_once(&fixture, &tool, &waiter, &mut audit, None);

    let tool = ScriptedTool::new(vec![
        completed("new@alpha.hk"),
        completed("b@yi.hk"),
        completed("Not Found"),
    ]);
    let outcome = run_once(&fixture, &tool, &waiter, &mut audit, Some(Mode::Restart));
    assert_eq!(outcome.mode, Mode::Restart);
    assert_eq!(outcome.counters.selected, 4);
    assert_eq!(tool.calls(), 3);
    assert_eq!(
        emails(&fixture),
        vec!["new@alpha.hk", "b@yi.hk", "", "Not Found"]
    );
}

#[test]
fn cancelled_run_resumes_from_checkpoint() {
    let fixture = companies();
    let mut audit = MemoryAudit::default();

    // Cancel during the interval after the first row.
    let tool = ScriptedTool::new(vec![completed("a@alpha.hk")]);
    let waiter = RecordingWaiter::cancel_on_wait(1);
    let first = run_once(&fixture, &tool, &waiter, &mut audit, None);
    assert_eq!(first.stop, RunStop::Cancelled);
    assert_eq!(emails(&fixture), vec!["a@alpha.hk", "", "", ""]);

    let tool = ScriptedTool::new(vec![completed("Not Found"), completed("d@delta.com")]);
    let waiter = RecordingWaiter::new();
    let second = run_once(&fixture, &tool, &waiter, &mut audit, None);
    assert_eq!(second.mode, Mode::Continue);
    assert_eq!(second.stop, RunStop::Completed);
    assert_eq!(
        emails(&fixture),
        vec!["a@alpha.hk", "Not Found", "", "d@delta.com"]
    );
}
