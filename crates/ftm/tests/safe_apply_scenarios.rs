//! End-to-end apply cycles against a real file system and real child processes.
//!
//! `sh -c <script> {config}` stands in for fastfetch, so `$0` inside each
//! script is the active configuration path.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ftm::application::catalog::ThemeCatalog;
use ftm::application::safe_apply::{ApplyOptions, SafeApplyEngine};
use ftm::infrastructure::backup::FileBackupStore;
use ftm::infrastructure::locator::{FsConfigLocator, LocatorPaths};
use ftm::infrastructure::probe::{ProbeCommand, SubprocessProbe, CONFIG_PLACEHOLDER};
use ftm_core::{ApplyResult, RestoreCheck, ThemeDescriptor, ThemeOrigin};
use tempfile::TempDir;

// ── Fixture ───────────────────────────────────────────────────────────────────

struct Fixture {
    _tmp: TempDir,
    config: PathBuf,
    themes_dir: PathBuf,
    system_dir: PathBuf,
    store: Arc<FileBackupStore>,
    catalog: ThemeCatalog,
    engine: SafeApplyEngine,
}

impl Fixture {
    fn new(script: &str, timeout: Duration) -> Self {
        Self::with_options(
            script,
            ApplyOptions {
                timeout,
                verify_restored: false,
            },
        )
    }

    fn with_options(script: &str, options: ApplyOptions) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let config = root.join("config/fastfetch/config.jsonc");
        let themes_dir = root.join("data/fastfetch/themes");
        let system_dir = root.join("usr/share/fastfetch/presets");
        fs::create_dir_all(config.parent().unwrap()).unwrap();
        fs::create_dir_all(&themes_dir).unwrap();
        fs::create_dir_all(&system_dir).unwrap();

        let locator = Arc::new(FsConfigLocator::new(LocatorPaths {
            active_override: None,
            config_home: Some(root.join("config")),
            data_dirs: vec![root.join("usr/share/fastfetch")],
            user_themes_dir: Some(themes_dir.clone()),
        }));
        let store = Arc::new(FileBackupStore::new(root.join("backups"), 5));
        let probe = Arc::new(SubprocessProbe::new(
            ProbeCommand {
                program: "sh".into(),
                args: vec!["-c".into(), script.into(), CONFIG_PLACEHOLDER.into()],
            },
            20,
        ));

        Self {
            config,
            themes_dir,
            system_dir,
            catalog: ThemeCatalog::new(locator.clone()),
            engine: SafeApplyEngine::new(locator, store.clone(), probe, options),
            store,
            _tmp: tmp,
        }
    }

    fn write_active(&self, content: &[u8]) {
        fs::write(&self.config, content).unwrap();
    }

    fn active(&self) -> Vec<u8> {
        fs::read(&self.config).unwrap()
    }

    fn user_theme(&self, name: &str, content: &[u8]) -> ThemeDescriptor {
        let path = self.themes_dir.join(format!("{name}.jsonc"));
        fs::write(&path, content).unwrap();
        ThemeDescriptor::new(name, path, ThemeOrigin::User)
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hanging_probe_is_killed_and_previous_bytes_restored() {
    // Arrange: active "A" (20 bytes), candidate "B" (30 bytes), probe sleeps 2 s
    let fx = Fixture::new("sleep 2", Duration::from_secs(1));
    let a = vec![b'A'; 20];
    fx.write_active(&a);
    let b = fx.user_theme("B", &[b'B'; 30]);

    // Act
    let started = Instant::now();
    let result = fx.engine.apply(&b).await;
    let elapsed = started.elapsed();

    // Assert
    assert!(
        matches!(result, ApplyResult::RevertedTimeout { ref theme, .. } if theme == "B"),
        "got {result:?}"
    );
    assert_eq!(fx.active(), a, "A must be restored byte-identical");
    assert!(elapsed >= Duration::from_millis(950), "returned before the bound: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_900), "probe was not killed at the bound: {elapsed:?}");
    assert_eq!(result.exit_code().code(), 3);
}

#[tokio::test]
async fn test_working_theme_is_applied() {
    // Arrange
    let fx = Fixture::new("cat \"$0\" >/dev/null", Duration::from_secs(5));
    fx.write_active(b"{\"logo\":\"A\"}");
    let c = fx.user_theme("C", b"{\"logo\":\"C\"}");

    // Act
    let result = fx.engine.apply(&c).await;

    // Assert
    assert!(matches!(result, ApplyResult::Applied { ref theme } if theme == "C"));
    assert_eq!(fx.active(), b"{\"logo\":\"C\"}");
    assert_eq!(fx.store.list().unwrap().len(), 1, "one snapshot per cycle");
}

#[tokio::test]
async fn test_reapplying_same_theme_snapshots_again() {
    let fx = Fixture::new("exit 0", Duration::from_secs(5));
    let c = fx.user_theme("C", b"C");

    assert!(fx.engine.apply(&c).await.is_applied());
    assert!(fx.engine.apply(&c).await.is_applied());

    assert_eq!(fx.active(), b"C");
    assert_eq!(fx.store.list().unwrap().len(), 2);
}

#[tokio::test]
async fn test_probe_sees_candidate_and_crash_reverts() {
    // Arrange: the probe fails on any configuration containing "broken"
    let fx = Fixture::new(
        "if grep -q broken \"$0\"; then echo 'JSON parse error' >&2; exit 1; fi",
        Duration::from_secs(5),
    );
    fx.write_active(b"good");
    let bad = fx.user_theme("bad", b"broken");

    // Act
    let result = fx.engine.apply(&bad).await;

    // Assert
    match result {
        ApplyResult::RevertedCrash { theme, reason, restore_check } => {
            assert_eq!(theme, "bad");
            assert!(reason.contains("exited with code 1"), "{reason}");
            assert!(reason.contains("JSON parse error"), "{reason}");
            assert_eq!(restore_check, RestoreCheck::Trusted);
        }
        other => panic!("expected RevertedCrash, got {other:?}"),
    }
    assert_eq!(fx.active(), b"good");
}

#[tokio::test]
async fn test_first_apply_that_fails_leaves_no_config() {
    let fx = Fixture::new("exit 7", Duration::from_secs(5));
    let theme = fx.user_theme("x", b"x");

    let result = fx.engine.apply(&theme).await;

    assert!(result.is_reverted());
    assert!(!fx.config.exists());
}

#[tokio::test]
async fn test_verify_restored_detects_already_broken_config() {
    let fx = Fixture::with_options(
        "exit 1",
        ApplyOptions {
            timeout: Duration::from_secs(5),
            verify_restored: true,
        },
    );
    fx.write_active(b"old");
    let theme = fx.user_theme("new", b"new");

    let result = fx.engine.apply(&theme).await;

    assert!(matches!(
        result,
        ApplyResult::RevertedCrash {
            restore_check: RestoreCheck::StillFailing(_),
            ..
        }
    ));
    assert_eq!(fx.active(), b"old");
}

#[tokio::test]
async fn test_unrestorable_config_is_critical_and_snapshot_survives() {
    // Arrange: the probe replaces the config directory with a plain file, so
    // neither the temp file nor the directory can be recreated on restore.
    let fx = Fixture::new(
        "d=$(dirname \"$0\"); rm -rf \"$d\"; : > \"$d\"; exit 1",
        Duration::from_secs(5),
    );
    fx.write_active(b"precious");
    let theme = fx.user_theme("B", b"B");

    // Act
    let result = fx.engine.apply(&theme).await;

    // Assert
    let location = match &result {
        ApplyResult::CriticalFailure {
            snapshot_location: Some(location),
            ..
        } => location.clone(),
        other => panic!("expected CriticalFailure, got {other:?}"),
    };
    assert_eq!(result.exit_code().code(), 4);
    assert_eq!(fs::read(location).unwrap(), b"precious");
}

#[tokio::test]
async fn test_user_theme_shadows_system_preset_of_same_name() {
    // Arrange
    let fx = Fixture::new("exit 0", Duration::from_secs(5));
    fs::write(fx.system_dir.join("neofetch.jsonc"), b"system").unwrap();
    fs::write(fx.system_dir.join("paleofetch.jsonc"), b"paleo").unwrap();
    fx.user_theme("neofetch", b"user");

    // Act
    let resolved = fx.catalog.resolve("neofetch").unwrap();
    let result = fx.engine.apply(&resolved).await;

    // Assert
    assert_eq!(resolved.origin, ThemeOrigin::User);
    assert!(result.is_applied());
    assert_eq!(fx.active(), b"user");
    assert_eq!(fx.catalog.list(Some(ThemeOrigin::System)).len(), 1);
}

#[tokio::test]
async fn test_restoring_a_snapshot_goes_through_the_engine() {
    // Arrange: apply C over A, then bring A back from its snapshot.
    let fx = Fixture::new("exit 0", Duration::from_secs(5));
    fx.write_active(b"A");
    let c = fx.user_theme("C", b"C");
    assert!(fx.engine.apply(&c).await.is_applied());

    let entry = fx.store.list().unwrap().remove(0);
    let snapshot = ThemeDescriptor::new("snapshot", entry.payload_path.clone(), ThemeOrigin::User);

    // Act
    let result = fx.engine.apply(&snapshot).await;

    // Assert
    assert!(result.is_applied());
    assert_eq!(fx.active(), b"A");
    let newest = &fx.store.list().unwrap()[0];
    assert_eq!(fs::read(&newest.payload_path).unwrap(), b"C", "the restore itself was snapshotted");
}

#[tokio::test]
async fn test_symlinked_private_config_survives_revert() {
    use std::os::unix::fs::{symlink, PermissionsExt};

    // Arrange: the active config links into a dotfiles checkout and is 0600
    let fx = Fixture::new("exit 1", Duration::from_secs(5));
    let real = fx.config.parent().unwrap().join("dotfiles/config.jsonc");
    fs::create_dir_all(real.parent().unwrap()).unwrap();
    fs::write(&real, b"A").unwrap();
    fs::set_permissions(&real, fs::Permissions::from_mode(0o600)).unwrap();
    symlink(&real, &fx.config).unwrap();
    let b = fx.user_theme("B", b"B");

    // Act
    let result = fx.engine.apply(&b).await;

    // Assert
    assert!(matches!(result, ApplyResult::RevertedCrash { .. }), "got {result:?}");
    assert!(fs::symlink_metadata(&fx.config).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&fx.config).unwrap(), real);
    assert_eq!(fs::read(&real).unwrap(), b"A");
    assert_eq!(fs::metadata(&real).unwrap().permissions().mode() & 0o777, 0o600);
}

#[tokio::test]
async fn test_symlinked_config_is_updated_in_place_on_success() {
    use std::os::unix::fs::symlink;

    let fx = Fixture::new("exit 0", Duration::from_secs(5));
    let real = fx.config.parent().unwrap().join("dotfiles/config.jsonc");
    fs::create_dir_all(real.parent().unwrap()).unwrap();
    fs::write(&real, b"A").unwrap();
    symlink(&real, &fx.config).unwrap();
    let c = fx.user_theme("C", b"C");

    assert!(fx.engine.apply(&c).await.is_applied());

    assert!(fs::symlink_metadata(&fx.config).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&real).unwrap(), b"C");
}

#[tokio::test]
async fn test_missing_probe_program_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.jsonc");
    fs::write(&config, b"A").unwrap();
    let theme_path = tmp.path().join("B.jsonc");
    fs::write(&theme_path, b"B").unwrap();

    let locator = Arc::new(FsConfigLocator::new(LocatorPaths {
        active_override: Some(config.clone()),
        ..LocatorPaths::default()
    }));
    let store = Arc::new(FileBackupStore::new(tmp.path().join("backups"), 5));
    let probe = Arc::new(SubprocessProbe::new(
        ProbeCommand {
            program: "ftm-no-such-fastfetch".into(),
            args: vec![CONFIG_PLACEHOLDER.into()],
        },
        20,
    ));
    let engine = SafeApplyEngine::new(locator, store.clone(), probe, ApplyOptions::default());

    let result = engine
        .apply(&ThemeDescriptor::new("B", theme_path, ThemeOrigin::User))
        .await;

    assert_eq!(result.exit_code().code(), 1);
    assert_eq!(fs::read(&config).unwrap(), b"A");
    assert!(store.list().unwrap().is_empty(), "no snapshot before the probe is known to exist");
    assert!(!tmp.path().join("backups").exists());
}
