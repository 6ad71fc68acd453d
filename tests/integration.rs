use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

fn run_bin(args: &[&str]) {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_choicegen"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

fn create_test_dir(name: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir_all(&test_dir).expect("failed to create test directory");

    test_dir
}

fn dir_str(dir: &Path) -> &str {
    dir.to_str()
        .expect("failed to convert test directory to string")
}

#[test]
fn basic_workflow() {
    let test_dir = create_test_dir("basic_workflow");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "kind = \"conjoint\"\n"
        + "seed = 42\n"
        + "n_resp = 30\n"
        + "n_tasks = 8\n"
        + "n_products = [3]\n"
        + "prob_competitor = 0.3\n"
        + "\n"
        + "[none]\n"
        + "asc = -2.5\n"
        + "std_dev = 1.0\n"
        + "prob = 0.7\n"
        + "\n"
        + "[[attributes]]\n"
        + "type = \"discrete\"\n"
        + "name = \"brand\"\n"
        + "std_dev = 0.3\n"
        + "levels = [\"BrandX\", \"BrandY\", \"BrandZ\"]\n"
        + "utilities = [0.0, 0.8, -0.5]\n"
        + "\n"
        + "[[attributes]]\n"
        + "type = \"continuous\"\n"
        + "name = \"price\"\n"
        + "std_dev = 0.0015\n"
        + "values = [499, 599, 699, 799, 899]\n"
        + "coef = -0.003\n"
        + "\n"
        + "[[competitors]]\n"
        + "label = \"Samsung\"\n"
        + "asc = 1.2\n"
        + "std_dev = 1.0\n"
        + "profile = [\"Samsung\", 899]\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    let test_dir_str = dir_str(&test_dir);
    let dataset_path = test_dir.join("dataset.csv");

    run_bin(&["--scenario-dir", test_dir_str, "generate"]);
    let first = fs::read(&dataset_path).expect("failed to read dataset");

    run_bin(&["--scenario-dir", test_dir_str, "generate"]);
    let second = fs::read(&dataset_path).expect("failed to read dataset");
    assert_eq!(first, second, "regenerated dataset differs");

    let text = String::from_utf8(first).expect("dataset is not valid UTF-8");
    let header = text.lines().next().expect("dataset is empty");
    assert_eq!(
        header,
        "respondent_id,task_id,alternative_id,chosen,brand,price"
    );

    run_bin(&["--scenario-dir", test_dir_str, "subset", "--n-keys", "5"]);
    let small = fs::read_to_string(test_dir.join("dataset-small.csv"))
        .expect("failed to read small dataset");
    assert!(small.lines().skip(1).all(|line| {
        ["R001,", "R002,", "R003,", "R004,", "R005,"]
            .iter()
            .any(|id| line.starts_with(id))
    }));

    run_bin(&["--scenario-dir", test_dir_str, "analyze"]);
    let summary =
        fs::read_to_string(test_dir.join("summary.toml")).expect("failed to read summary");
    assert!(summary.contains("alternatives_per_task"));

    run_bin(&["--scenario-dir", test_dir_str, "clean"]);
    assert!(!dataset_path.exists());
    assert!(!test_dir.join("dataset-small.csv").exists());
    assert!(!test_dir.join("summary.toml").exists());
    assert!(config_path.exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn bundled_scenarios() {
    let scenarios_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let mut entries: Vec<_> = fs::read_dir(&scenarios_dir)
        .expect("failed to read scenarios directory")
        .map(|entry| entry.expect("failed to read entry").path())
        .filter(|path| path.join("config.toml").is_file())
        .collect();
    entries.sort();
    assert_eq!(entries.len(), 12);

    for scenario in entries {
        let name = scenario
            .file_name()
            .and_then(|name| name.to_str())
            .expect("failed to get scenario name");
        let test_dir = create_test_dir(&format!("scenario_{name}"));
        fs::copy(scenario.join("config.toml"), test_dir.join("config.toml"))
            .expect("failed to copy config file");

        let test_dir_str = dir_str(&test_dir);
        run_bin(&["--scenario-dir", test_dir_str, "generate"]);
        run_bin(&["--scenario-dir", test_dir_str, "subset"]);
        run_bin(&["--scenario-dir", test_dir_str, "analyze"]);
        assert!(test_dir.join("dataset-small.csv").is_file());
        assert!(test_dir.join("summary.toml").is_file());

        fs::remove_dir_all(&test_dir).ok();
    }
}
