use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use ndarray::{array, Array2, Array4};
use st_panel::npy::{write_npy, NpyArray};
use st_panel::{sample_id, SignalSet};
use tempfile::tempdir;

const SAMPLES_SUBDIR: &str = "generative/recorded_informinit_gen_samples";
const ANALYSIS_SUBDIR: &str = "analysis/hx_analysis_precomp";

fn save(path: &Path, array: NpyArray) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_npy(path, &array).unwrap();
}

fn write_training_tree(root: &Path, samples: usize, scale: [f64; 2]) {
    let analysis = root.join(ANALYSIS_SUBDIR);
    save(&analysis.join("pcomponents_4000.npy"), NpyArray::from_f64(array![[1.0, 0.0]].into_dyn()));
    save(&analysis.join("hx_mu_4000.npy"), NpyArray::from_f64(array![0.0, 0.0].into_dyn()));
    save(
        &analysis.join("hx_std_4000.npy"),
        NpyArray::from_f64(array![scale[0], scale[1]].into_dyn()),
    );
    save(
        &analysis.join("hx_pca_4000.npy"),
        NpyArray::from_f32(Array2::from_shape_fn((1200, 25), |(r, c)| (r + c) as f32).into_dyn()),
    );

    let signals = SignalSet::default();
    for index in 0..samples {
        let dir = root.join(SAMPLES_SUBDIR).join(sample_id(index));
        save(
            &dir.join("agent_hxs.npy"),
            NpyArray::from_f32(array![[2.0f32, 4.0], [0.0, 0.0]].into_dyn()),
        );
        for signal in signals.loading_signals().iter().skip(1) {
            save(
                &dir.join(&signal.file_name),
                NpyArray::from_f32(array![[1.0f32, 1.0], [0.0, 2.0]].into_dyn()),
            );
        }
        save(
            &dir.join("obs.npy"),
            NpyArray::from_u8(Array4::from_elem((2, 3, 6, 6), 128).into_dyn()),
        );
        for signal in signals.image_signals().iter().skip(1) {
            save(
                &dir.join(&signal.file_name),
                NpyArray::from_u8(Array4::from_elem((2, 6, 6, 3), 32).into_dyn()),
            );
        }
    }
}

fn run_cli(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_st-panel-export"))
        .args(args)
        .env_remove("ST_PANEL_INPUT")
        .env_remove("ST_PANEL_OUTPUT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn exports_requested_samples_with_yes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let output = dir.path().join("static/data");
    write_training_tree(&input, 3, [1.0, 2.0]);

    let result = run_cli(
        &[
            "--samples",
            "3",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
            "--yes",
        ],
        "",
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("Done!"));

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("panel_data.json")).unwrap()).unwrap();
    let base = document["base_hx_loadings"].as_array().unwrap();
    assert_eq!(base.len(), 1000);
    assert_eq!(base[0].as_array().unwrap().len(), 20);

    let samples = document["samples"].as_object().unwrap();
    let ids: Vec<&String> = samples.keys().collect();
    assert_eq!(ids, ["sample_00000", "sample_00001", "sample_00002"]);
    for record in samples.values() {
        let record = record.as_object().unwrap();
        assert_eq!(record.len(), 6);
        assert_eq!(record["hx_loadings"], serde_json::json!([[2.0], [0.0]]));
        assert_eq!(record["grad_hx_hx_direction_3_loadings"], serde_json::json!([[1.0], [0.0]]));
    }
    let signals = [
        "obs",
        "sal_action",
        "sal_value",
        "sal_direction_1",
        "sal_direction_2",
        "sal_direction_3",
    ];
    for signal in signals {
        assert!(output.join("sample_00001").join(signal).join("1.png").is_file(), "{signal}");
    }
}

#[test]
fn declining_the_prompt_keeps_existing_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let output = dir.path().join("out");
    write_training_tree(&input, 1, [1.0, 2.0]);
    fs::create_dir_all(&output).unwrap();
    fs::write(output.join("keep.txt"), "previous export").unwrap();

    let result = run_cli(
        &[
            "--samples",
            "1",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
        ],
        "n\n",
    );
    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("This folder will be deleted"));
    assert!(stdout.contains("Process cancelled!"));
    assert!(output.join("keep.txt").exists());
    assert!(!output.join("panel_data.json").exists());
}

#[test]
fn answering_yes_at_the_prompt_exports() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let output = dir.path().join("out");
    write_training_tree(&input, 1, [1.0, 2.0]);

    let result = run_cli(
        &[
            "--samples",
            "1",
            "--directions",
            "1,2,3",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
        ],
        "YES\n",
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    assert!(output.join("panel_data.json").is_file());
    assert!(output.join("sample_00000/obs/0.png").is_file());
}

#[test]
fn degenerate_basis_fails_before_touching_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let output = dir.path().join("out");
    write_training_tree(&input, 1, [1.0, 0.0]);

    let result = run_cli(
        &[
            "--samples",
            "1",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
            "--yes",
        ],
        "",
    );
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("degenerate basis"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn missing_sample_names_the_sample() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let output = dir.path().join("out");
    write_training_tree(&input, 1, [1.0, 2.0]);

    let result = run_cli(
        &[
            "--samples",
            "2",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
            "--yes",
        ],
        "",
    );
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("sample_00001"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn output_directory_with_parent_component_is_replaced() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train");
    let site = dir.path().join("site");
    write_training_tree(&input, 1, [1.0, 2.0]);
    fs::create_dir_all(site.join("sub")).unwrap();
    fs::write(site.join("old.txt"), "previous export").unwrap();
    let output = site.join("sub").join("..");

    let result = run_cli(
        &[
            "--samples",
            "1",
            "--input-directory",
            input.to_str().unwrap(),
            "--output-directory",
            output.to_str().unwrap(),
            "--yes",
        ],
        "",
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains(&format!("Output folder: {}", site.display())), "{stdout}");
    assert!(site.join("panel_data.json").is_file());
    assert!(site.join("sample_00000/obs/0.png").is_file());
}
