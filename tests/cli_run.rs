#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

const SKULL_STRIP_SCRIPT: &str = "#!/bin/sh\ncp \"$1\" \"$2\"\n";

const REGISTRATION_SCRIPT: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -m) moving="$2"; shift 2 ;;
    -o) prefix="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$(basename "$moving")" in
  sub2*) echo "registration diverged" >&2; exit 1 ;;
esac
cp "$moving" "${prefix}Warped.nii.gz"
cp "$moving" "${prefix}InverseWarped.nii.gz"
echo affine > "${prefix}0GenericAffine.mat"
"#;

const INFERENCE_SCRIPT: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in_dir="$2"; shift 2 ;;
    -o) out_dir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
for f in "$in_dir"/*_0000.nii.gz; do
  name=$(basename "$f" _0000.nii.gz)
  cp "$f" "$out_dir/$name.nii.gz"
done
"#;

fn write_script(path: &Path, body: &str, mode: u32) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[test]
fn run_segments_registered_subjects_and_writes_manifest() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("sub1.nii.gz"), b"scan-1").unwrap();
    fs::write(input.join("sub2.nii.gz"), b"scan-2").unwrap();
    let atlas = temp.path().join("atlas.nii");
    fs::write(&atlas, b"atlas").unwrap();

    let tools = temp.path().join("tools");
    fs::create_dir(&tools).unwrap();
    // Left non-executable on purpose: the skull-strip stage adds the bit.
    write_script(&tools.join("runROBEX.sh"), SKULL_STRIP_SCRIPT, 0o644);
    write_script(&tools.join("ants.sh"), REGISTRATION_SCRIPT, 0o755);
    write_script(&tools.join("predict.sh"), INFERENCE_SCRIPT, 0o755);

    let out_root = temp.path().join("output");
    let manifest = temp.path().join("reports/manifest.yaml");
    let metrics = temp.path().join("reports/metrics.json");

    Command::cargo_bin("neuroseg")
        .expect("binary present")
        .arg("run")
        .arg("--input")
        .arg(&input)
        .arg("--atlas")
        .arg(&atlas)
        .arg("--out-root")
        .arg(&out_root)
        .arg("--skull-strip")
        .arg(tools.join("runROBEX.sh"))
        .arg("--registration")
        .arg(tools.join("ants.sh"))
        .arg("--inference")
        .arg(tools.join("predict.sh"))
        .arg("--timeout-secs")
        .arg("60")
        .arg("--manifest")
        .arg(&manifest)
        .arg("--metrics-json")
        .arg(&metrics)
        .assert()
        .success();

    let mut staged: Vec<String> = fs::read_dir(out_root.join("ants"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    staged.sort();
    assert_eq!(staged, vec!["sub1_0000.nii.gz"]);
    assert!(out_root.join("predictions/sub1.nii.gz").is_file());
    assert!(!out_root.join("predictions/sub2.nii.gz").exists());

    let manifest_content = fs::read_to_string(&manifest).unwrap();
    assert!(manifest_content.contains("sub1_0000.nii.gz"));
    assert!(manifest_content.contains("sha256"));
    assert!(manifest_content.contains("sub2.nii.gz"));

    let metrics_content = fs::read_to_string(&metrics).unwrap();
    assert!(metrics_content.contains("registering"));
}

#[test]
fn run_fails_when_skull_strip_fails() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("sub1.nii.gz"), b"scan-1").unwrap();
    let atlas = temp.path().join("atlas.nii");
    fs::write(&atlas, b"atlas").unwrap();
    let script = temp.path().join("runROBEX.sh");
    write_script(&script, "#!/bin/sh\necho 'cannot read volume' >&2\nexit 2\n", 0o755);
    let out_root = temp.path().join("output");

    Command::cargo_bin("neuroseg")
        .expect("binary present")
        .arg("run")
        .arg("--input")
        .arg(&input)
        .arg("--atlas")
        .arg(&atlas)
        .arg("--out-root")
        .arg(&out_root)
        .arg("--skull-strip")
        .arg(&script)
        .assert()
        .failure();

    assert!(!out_root.join("ants").exists());
}
