//! Integration tests for berth

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// A minimal data app: one requirement and an entry file
    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "streamlit>=1.30\n").unwrap();
        std::fs::write(dir.path().join("app.py"), "import streamlit as st\n").unwrap();
        dir
    }

    /// berth running in `dir`, isolated from the user's config and state
    fn berth(dir: &Path) -> Command {
        let home = std::env::temp_dir().join("berth-integration-home");
        let mut cmd = cargo_bin_cmd!("berth");
        cmd.current_dir(dir)
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join("config"))
            .env("XDG_STATE_HOME", home.join("state"))
            .env_remove("BERTH_CONFIG")
            .env_remove("BERTH_ENTRY")
            .env_remove("BERTH_PORT")
            .env_remove("BERTH_ADDRESS")
            .env_remove("RUST_LOG");
        cmd
    }

    fn plan_json(dir: &Path) -> serde_json::Value {
        let output = berth(dir).args(["plan", "--json"]).output().unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn is_root() -> bool {
        berth::identity::privilege::is_root()
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("container bootstrap"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("berth"));
    }

    #[test]
    fn plan_lists_layers_and_launch() {
        let dir = project();
        berth(dir.path())
            .arg("plan")
            .assert()
            .success()
            .stdout(predicate::str::contains("resolve"))
            .stdout(predicate::str::contains("install 1 requirement"))
            .stdout(predicate::str::contains("privilege"))
            .stdout(predicate::str::contains(
                "streamlit run app.py --server.port=8501 --server.address=0.0.0.0",
            ));
    }

    #[test]
    fn plan_json_is_ready_snapshot() {
        let dir = project();
        let plan = plan_json(dir.path());
        assert_eq!(plan["state"], "ready");
        let stages: Vec<_> = plan["layers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["stage"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(stages, vec!["resolve", "assemble", "privilege"]);
    }

    #[test]
    fn source_edit_keeps_dependency_key() {
        let dir = project();
        let before = plan_json(dir.path());

        std::fs::write(dir.path().join("app.py"), "import streamlit as st\nst.title('hi')\n")
            .unwrap();
        let after = plan_json(dir.path());

        assert_eq!(before["layers"][0]["key"], after["layers"][0]["key"]);
        assert_ne!(before["layers"][1]["key"], after["layers"][1]["key"]);
    }

    #[test]
    fn plan_without_manifest_fails() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .arg("plan")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Path not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn dockerfile_prints_instructions() {
        let dir = project();
        berth(dir.path())
            .arg("dockerfile")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("FROM python:3.11-slim"))
            .stdout(predicate::str::contains("USER 10001:10001"))
            .stdout(predicate::str::contains("EXPOSE 8501"))
            .stdout(predicate::str::contains("ENTRYPOINT [\"streamlit\",\"run\"]"))
            .stdout(predicate::str::contains(
                "CMD [\"app.py\",\"--server.port=8501\",\"--server.address=0.0.0.0\"]",
            ));
    }

    #[test]
    fn dockerfile_writes_file() {
        let dir = project();
        berth(dir.path())
            .args(["dockerfile", "--output", "Dockerfile"])
            .assert()
            .success();
        let content = std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap();
        assert!(content.contains("COPY app/ ./"));
    }

    #[test]
    fn init_creates_config_once() {
        let dir = TempDir::new().unwrap();
        berth(dir.path()).arg("init").assert().success();
        assert!(dir.path().join("berth.toml").is_file());

        berth(dir.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[launch]"))
            .stdout(predicate::str::contains("port = 8501"));
    }

    #[test]
    fn config_set_changes_declared_port() {
        let dir = project();
        berth(dir.path())
            .args(["config", "set", "launch.port", "9000"])
            .assert()
            .success();

        berth(dir.path())
            .arg("dockerfile")
            .assert()
            .success()
            .stdout(predicate::str::contains("EXPOSE 9000"));

        // --no-local ignores the project file
        berth(dir.path())
            .args(["--no-local", "dockerfile"])
            .assert()
            .success()
            .stdout(predicate::str::contains("EXPOSE 8501"));
    }

    #[test]
    fn config_set_unknown_key() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Unknown config key"));
        assert!(!dir.path().join("berth.toml").exists());
    }

    #[test]
    fn launch_missing_entry() {
        let dir = project();
        std::fs::remove_file(dir.path().join("app.py")).unwrap();
        berth(dir.path())
            .arg("launch")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Entry file not found"));
    }

    #[test]
    fn launch_invalid_override() {
        let dir = project();
        berth(dir.path())
            .args(["launch", "--", "app.py", "--server.port=http"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid launch argument"));
    }

    #[test]
    fn launch_enforced_port_mismatch() {
        let dir = project();
        berth(dir.path())
            .args(["launch", "--port-policy", "enforced", "--port", "9000"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("does not match declared port 8501"));
    }

    #[test]
    fn launch_propagates_exit_status() {
        // As root berth would drop to the runtime identity, which cannot
        // enter the private temp directory
        if is_root() {
            return;
        }
        let dir = project();
        std::fs::write(
            dir.path().join("berth.toml"),
            "[launch]\nexecutable = [\"sh\", \"-c\", \"exit 3\"]\n",
        )
        .unwrap();

        berth(dir.path()).args(["launch", "--wait"]).assert().code(3);
        berth(dir.path()).arg("launch").assert().code(3);
    }

    #[test]
    fn run_without_runtime() {
        let dir = project();
        std::fs::write(
            dir.path().join("berth.toml"),
            "[runtime]\nbinary = \"berth-no-such-runtime\"\n",
        )
        .unwrap();

        berth(dir.path())
            .arg("run")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Container runtime not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn stage_stops_at_failed_resolver() {
        let dir = project();
        std::fs::write(
            dir.path().join("berth.toml"),
            "[resolver]\ninstaller = [\"false\"]\n",
        )
        .unwrap();
        let staging = TempDir::new().unwrap();
        let root = staging.path().join("rootfs");

        berth(dir.path())
            .args(["stage", "--root"])
            .arg(&root)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Dependency resolution failed"));

        assert!(!root.join("app").exists());
        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(root.join(".berth/build.json")).unwrap())
                .unwrap();
        assert_eq!(record["failed_stage"], "resolve");
        assert_eq!(record["snapshot"]["state"], "pending");
    }

    #[test]
    fn stage_assembles_application() {
        let dir = project();
        std::fs::write(
            dir.path().join("berth.toml"),
            "[resolver]\ninstaller = [\"true\"]\n",
        )
        .unwrap();

        let assert = berth(dir.path()).arg("stage").assert();
        let root = dir.path().join(".berth/rootfs");
        assert!(root.join("app/app.py").is_file());

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(root.join(".berth/build.json")).unwrap())
                .unwrap();
        if is_root() {
            assert.success();
            assert_eq!(record["snapshot"]["state"], "ready");
        } else {
            // Handing files to uid 10001 needs root
            assert
                .code(1)
                .stderr(predicate::str::contains("Failed to transfer ownership"));
            assert_eq!(record["failed_stage"], "privilege");
        }
    }

    #[test]
    fn completions_bash() {
        let dir = TempDir::new().unwrap();
        berth(dir.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("berth"));
    }
}
