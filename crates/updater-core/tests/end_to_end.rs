//! Full cycles: fetch, diff, permission-gated dispatch, batched install.

use std::sync::Arc;

use tokio::sync::mpsc;
use updater_core::fakes::{snapshot_of, RecordingInstaller, ScriptedFetcher};
use updater_core::{
    Callbacks, ChangeEvent, DispatchOutcome, Dispatcher, InstallQueue, InstallTask, PolicyPatch,
    RegistrationTable, UpdaterConfig, UpdaterEngine,
};

struct Fixture {
    engine: UpdaterEngine,
    installer: Arc<RecordingInstaller>,
}

async fn fixture(previous: &[(&str, &str)], current: &[(&str, &str)]) -> Fixture {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push(snapshot_of(previous)).push(snapshot_of(current));
    let installer = Arc::new(RecordingInstaller::new());
    let engine = UpdaterEngine::new(
        UpdaterConfig::default(),
        fetcher,
        installer.clone(),
        None,
    );

    let baseline = engine.check_update().await.unwrap();
    assert!(baseline.baseline);
    Fixture { engine, installer }
}

fn allow_install() -> PolicyPatch {
    PolicyPatch::default()
        .allow_install(true)
        .allow_receive_message(true)
}

#[tokio::test]
async fn update_and_new_queue_exactly_one_install() {
    let f = fixture(&[("a", "v1")], &[("a", "v2"), ("b", "v1")]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    f.engine
        .register(
            "a",
            Callbacks::new().on_update(move |name, from, to| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((name, from, to));
                    Ok(true)
                }
            }),
            false,
        )
        .unwrap();
    f.engine
        .update_policy(&f.engine.access_key(), "a", &allow_install())
        .unwrap();

    let report = f.engine.check_update().await.unwrap();
    assert_eq!(
        report.changes,
        vec![
            ChangeEvent::update("a", "koishi-plugin-a", "v1", "v2"),
            ChangeEvent::new("b", "koishi-plugin-b", "v1"),
        ]
    );
    assert_eq!(
        report.outcomes,
        vec![DispatchOutcome::InstallQueued, DispatchOutcome::NoRegistration]
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ("a".to_string(), "v1".to_string(), "v2".to_string())
    );

    let calls = f.installer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].packages.len(), 1);
    assert_eq!(
        calls[0].packages.get("koishi-plugin-a").map(String::as_str),
        Some("v2")
    );
}

#[tokio::test]
async fn update_and_new_through_the_dispatcher_leave_one_task() {
    let key = updater_core::AccessKey::generate();
    let table = Arc::new(RegistrationTable::new(key.clone()));
    let queue = Arc::new(InstallQueue::new(Arc::new(RecordingInstaller::new()), false));
    let dispatcher = Dispatcher::new(table.clone(), queue.clone(), true);

    table
        .register("a", Callbacks::new().on_update(|_, _, _| async { Ok(true) }), false)
        .unwrap();
    table.update_policy(&key, "a", &allow_install()).unwrap();

    let events = updater_core::diff_snapshots(
        &snapshot_of(&[("a", "v1")]),
        &snapshot_of(&[("a", "v2"), ("b", "v1")]),
    );
    dispatcher.dispatch_all(&events).await;

    assert_eq!(queue.snapshot(), vec![InstallTask::new("koishi-plugin-a", "v2")]);
}

#[tokio::test]
async fn delete_invokes_callback_without_installing() {
    let f = fixture(&[("a", "v1")], &[]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    f.engine
        .register(
            "a",
            Callbacks::new().on_delete(move |name| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(name);
                    Ok(true)
                }
            }),
            false,
        )
        .unwrap();
    f.engine
        .update_policy(&f.engine.access_key(), "a", &allow_install())
        .unwrap();

    let report = f.engine.check_update().await.unwrap();
    assert_eq!(
        report.changes,
        vec![ChangeEvent::delete("a", "koishi-plugin-a", "v1")]
    );
    assert_eq!(report.outcomes, vec![DispatchOutcome::Acknowledged]);
    assert_eq!(rx.try_recv().unwrap(), "a");
    assert!(report.install.is_none());
    assert!(f.installer.calls().is_empty());
}

#[tokio::test]
async fn muted_registration_hears_nothing() {
    let f = fixture(&[("a", "v1")], &[("a", "v2")]).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();
    let (tx_new, tx_update, tx_delete) = (tx.clone(), tx.clone(), tx);
    f.engine
        .register(
            "a",
            Callbacks::new()
                .on_new(move |_, _| {
                    let tx = tx_new.clone();
                    async move {
                        let _ = tx.send("new");
                        Ok(true)
                    }
                })
                .on_update(move |_, _, _| {
                    let tx = tx_update.clone();
                    async move {
                        let _ = tx.send("update");
                        Ok(true)
                    }
                })
                .on_delete(move |_| {
                    let tx = tx_delete.clone();
                    async move {
                        let _ = tx.send("delete");
                        Ok(true)
                    }
                }),
            false,
        )
        .unwrap();
    f.engine
        .update_policy(
            &f.engine.access_key(),
            "a",
            &PolicyPatch::default()
                .allow_install(true)
                .allow_receive_message(false),
        )
        .unwrap();

    let report = f.engine.check_update().await.unwrap();
    assert_eq!(report.outcomes, vec![DispatchOutcome::Muted]);
    assert!(rx.try_recv().is_err());
    assert!(f.installer.calls().is_empty());
}

#[tokio::test]
async fn install_request_without_permission_is_dropped() {
    let f = fixture(&[("a", "v1")], &[("a", "v2")]).await;
    f.engine
        .register("a", Callbacks::new().on_update(|_, _, _| async { Ok(true) }), false)
        .unwrap();

    let report = f.engine.check_update().await.unwrap();
    assert_eq!(report.outcomes, vec![DispatchOutcome::InstallNotPermitted]);
    assert!(report.install.is_none());
    assert!(f.installer.calls().is_empty());
}

#[tokio::test]
async fn failing_callback_does_not_block_other_events() {
    let f = fixture(&[("a", "v1"), ("b", "v1")], &[("a", "v2"), ("b", "v2")]).await;
    f.engine
        .register(
            "a",
            Callbacks::new().on_update(|_, _, _| async {
                Err::<bool, _>(anyhow::anyhow!("subscriber crashed"))
            }),
            false,
        )
        .unwrap();
    f.engine
        .register("b", Callbacks::new().on_update(|_, _, _| async { Ok(true) }), false)
        .unwrap();
    f.engine
        .update_policy(&f.engine.access_key(), "b", &allow_install())
        .unwrap();

    let report = f.engine.check_update().await.unwrap();
    assert_eq!(
        report.outcomes,
        vec![DispatchOutcome::CallbackFailed, DispatchOutcome::InstallQueued]
    );
    assert_eq!(f.installer.calls().len(), 1);
}

#[tokio::test]
async fn explicit_install_uses_previous_snapshot_version() {
    let f = fixture(&[("a", "v1")], &[("a", "v1")]).await;
    let token = f
        .engine
        .register("a", Callbacks::new(), false)
        .unwrap();

    let outcome = f.engine.install("a", token).await.unwrap();
    assert_eq!(outcome, updater_core::InstallOutcome::NotPermitted);

    f.engine
        .update_policy(&f.engine.access_key(), "a", &allow_install())
        .unwrap();
    let outcome = f.engine.install("a", token).await.unwrap();
    assert!(matches!(outcome, updater_core::InstallOutcome::Flushed { .. }));
    assert_eq!(
        f.installer.calls()[0].packages.get("koishi-plugin-a").map(String::as_str),
        Some("v1")
    );

    let wrong = updater_core::VerifyToken::try_from(token.value() ^ 1).unwrap();
    let outcome = f.engine.install("a", wrong).await.unwrap();
    assert_eq!(outcome, updater_core::InstallOutcome::InvalidToken);
}

#[tokio::test]
async fn explicit_install_of_uncatalogued_name_fails() {
    let f = fixture(&[("a", "v1")], &[("a", "v1")]).await;
    let token = f.engine.register("zz", Callbacks::new(), false).unwrap();
    f.engine
        .update_policy(&f.engine.access_key(), "zz", &allow_install())
        .unwrap();

    let err = f.engine.install("zz", token).await.unwrap_err();
    assert!(matches!(err, updater_core::UpdaterError::NotInCatalog { .. }));
}
