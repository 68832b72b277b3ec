//! Completion derivation and explicit sign-off through the SQLite backend.

mod common;

use common::*;

use qcledger::catalog::ProcessCatalog;
use qcledger::model::{CheckObservation, MergeBatch, Station, Verdict};
use qcledger::store::{QcStore, StoreError};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn untouched_process_reports_catalog_denominator() {
    let store = memory_store().await;
    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert!(!status.exists);
    assert!(!status.started);
    assert!(!status.completed);
    assert_eq!(status.completed_checks, 0);
    assert_eq!(status.total_checks, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completion_requires_every_catalog_check() {
    let store = memory_store().await;

    // Both stations finish one of the two catalog checks.
    store
        .merge_checks(&module_x_batch("P1", &["Jig setup"]))
        .await
        .unwrap();
    store
        .merge_checks(&module_y_batch("P1", &["Jig setup"]))
        .await
        .unwrap();

    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert!(status.started);
    assert!(!status.module_x_complete, "one of two checks is not all");
    assert!(!status.completed);
    assert_eq!(status.completed_checks, 1);
    assert_eq!(status.total_checks, 2);

    // The second check closes the process.
    store
        .merge_checks(&module_x_batch("P1", &["Visual inspection"]))
        .await
        .unwrap();
    store
        .merge_checks(&module_y_batch("P1", &["Visual inspection"]))
        .await
        .unwrap();

    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert!(status.module_x_complete);
    assert!(status.module_y_complete);
    assert!(status.both_modules_complete);
    assert!(status.completed);
    assert_eq!(status.completed_checks, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn not_applicable_counts_as_a_verdict() {
    let store = memory_store().await;
    for check in ["Jig setup", "Visual inspection"] {
        store
            .merge_checks(
                &MergeBatch::new("P1", "Cell sorting").with_observation(
                    CheckObservation::new(check)
                        .with_module_x(Verdict::NotApplicable)
                        .with_module_y(Verdict::Ok),
                ),
            )
            .await
            .unwrap();
    }

    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert!(status.completed, "N/A is an operator decision, not a gap");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uncataloged_process_counts_its_own_rows() {
    let store = memory_store().await;
    store
        .merge_checks(
            &MergeBatch::new("P1", "Rework").with_observation(
                CheckObservation::new("Weld repair")
                    .with_module_x(Verdict::Ok)
                    .with_module_y(Verdict::Ok),
            ),
        )
        .await
        .unwrap();

    let status = store.process_status("P1", "Rework").await.unwrap();
    assert_eq!(status.total_checks, 1);
    assert!(status.completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mark_process_complete_stamps_every_open_row() {
    let store = memory_store().await;
    store
        .merge_checks(&module_x_batch("P1", &["Jig setup", "Visual inspection"]))
        .await
        .unwrap();

    let before = store.get_checks("P1", Some("Cell sorting")).await.unwrap();
    assert!(before.iter().all(|r| r.end_date.is_none()));

    store.mark_process_complete("P1", "Cell sorting").await.unwrap();

    let after = store.get_checks("P1", Some("Cell sorting")).await.unwrap();
    assert!(after.iter().all(|r| r.end_date.is_some()));
    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert!(status.completed, "sign-off forces completion");
    assert!(
        !status.module_y_complete,
        "sign-off stamps end dates, it does not invent verdicts"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mark_process_complete_restamps_every_row() {
    let store = memory_store().await;
    store
        .merge_checks(&module_x_batch("P1", &["Jig setup"]))
        .await
        .unwrap();
    store
        .merge_checks(&module_y_batch("P1", &["Jig setup"]))
        .await
        .unwrap();
    let organic = store.get_checks("P1", Some("Cell sorting")).await.unwrap()[0]
        .end_date
        .expect("row completed by merge");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store.mark_process_complete("P1", "Cell sorting").await.unwrap();

    // The sign-off is a one-shot bulk stamp, it overrides organic end dates.
    let stamped = store.get_checks("P1", Some("Cell sorting")).await.unwrap()[0]
        .end_date
        .unwrap();
    assert!(stamped > organic);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mark_process_complete_validates_its_arguments() {
    let store = memory_store().await;
    let err = store
        .mark_process_complete("P1", "")
        .await
        .expect_err("empty process name");
    assert!(matches!(err, StoreError::Validation { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn not_ok_checks_reports_each_failing_station() {
    let store = memory_store().await;
    store
        .merge_checks(
            &MergeBatch::new("P1", "Cell sorting")
                .with_observation(
                    CheckObservation::new("Jig setup")
                        .with_module_x(Verdict::NotOk)
                        .with_module_y(Verdict::NotOk),
                )
                .with_observation(
                    CheckObservation::new("Visual inspection").with_module_x(Verdict::Ok),
                ),
        )
        .await
        .unwrap();

    let findings = store
        .not_ok_checks("P1", &["Cell sorting".to_string()])
        .await
        .unwrap();
    assert_eq!(findings.len(), 2);
    assert!(
        findings
            .iter()
            .any(|f| f.check_name == "Jig setup" && f.station == Station::ModuleX)
    );
    assert!(
        findings
            .iter()
            .any(|f| f.check_name == "Jig setup" && f.station == Station::ModuleY)
    );

    // A process filter that excludes the data finds nothing.
    let none = store
        .not_ok_checks("P1", &["Pack assembly".to_string()])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dashboard_groups_processes_per_pack() {
    let store = memory_store().await;
    store
        .merge_checks(&module_x_batch("P1", &["Jig setup"]))
        .await
        .unwrap();
    store
        .merge_checks(
            &MergeBatch::new("P1", "Module assembly")
                .with_observation(CheckObservation::new("Cell stacking").with_module_x(Verdict::Ok)),
        )
        .await
        .unwrap();
    store
        .merge_checks(&module_x_batch("P2", &["Jig setup"]))
        .await
        .unwrap();

    let board = store.dashboard().await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].pack_id, "P1");
    assert_eq!(
        board[0].processes,
        vec!["Cell sorting".to_string(), "Module assembly".to_string()]
    );
    assert_eq!(board[1].pack_id, "P2");
    assert_eq!(board[1].processes, vec!["Cell sorting".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn standard_line_catalog_drives_real_process_names() {
    let catalog = ProcessCatalog::standard_line();
    let store = qcledger::store::SqliteQcStore::connect_in_memory(catalog)
        .await
        .unwrap();

    let status = store.process_status("P1", "EOL Testing").await.unwrap();
    assert_eq!(status.total_checks, 1);
    let status = store.process_status("P1", "Cell sorting").await.unwrap();
    assert_eq!(status.total_checks, 3);
}
