use std::{fs, path::Path, path::PathBuf};

use tempfile::TempDir;
use tsc_scoped::closure::Closure;
use tsc_scoped::config;
use tsc_scoped::synthesize;

fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn load_config(root: &Path, contents: &str) -> config::EffectiveConfig {
    let path = write_file(root, "tsconfig.json", contents);
    config::load_effective_config(&path).unwrap()
}

fn read_back(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn string_array(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry.as_str().unwrap().to_owned())
        .collect()
}

#[test]
fn discovered_closure_becomes_an_exact_files_list() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(&root, r#"{ "compilerOptions": { "strict": true }, "include": ["src"] }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");
    let b = write_file(&root, "src/b.ts", "export {};\n");

    let closure = Closure::Discovered {
        source_files: vec![a.clone(), b.clone()],
        setup_files: Vec::new(),
    };
    let synthetic =
        synthesize::synthesize(&config, &closure, &[a.clone()], false).unwrap();
    let body = read_back(synthetic.path());

    let files = string_array(&body["files"]);
    assert_eq!(
        files,
        vec![
            a.to_string_lossy().into_owned(),
            b.to_string_lossy().into_owned()
        ]
    );
    // Options are inlined; a relative extends reference would not resolve
    // from the temp directory.
    assert!(body.get("extends").is_none());
    assert!(body.get("include").is_none());
    assert!(body.get("exclude").is_none());
    assert_eq!(body["compilerOptions"]["noEmit"], serde_json::json!(true));
    assert_eq!(body["compilerOptions"]["strict"], serde_json::json!(true));
}

#[test]
fn fallback_carries_original_patterns_rebased_absolute() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(
        &root,
        r#"{ "compilerOptions": {}, "include": ["src"], "exclude": ["src/generated"] }"#,
    );
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let synthetic =
        synthesize::synthesize(&config, &Closure::Fallback, &[a.clone()], false).unwrap();
    let body = read_back(synthetic.path());

    assert_eq!(
        string_array(&body["files"]),
        vec![a.to_string_lossy().into_owned()]
    );
    assert_eq!(
        string_array(&body["include"]),
        vec![root.join("src").to_string_lossy().into_owned()]
    );
    assert_eq!(
        string_array(&body["exclude"]),
        vec![root.join("src/generated").to_string_lossy().into_owned()]
    );
}

#[test]
fn fallback_without_include_writes_the_implicit_default() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let synthetic =
        synthesize::synthesize(&config, &Closure::Fallback, &[a], false).unwrap();
    let body = read_back(synthetic.path());

    // An explicit files list suppresses the compiler's implicit include, so
    // the default has to be spelled out for the fallback to stay correct.
    assert_eq!(
        string_array(&body["include"]),
        vec![root.join("**/*").to_string_lossy().into_owned()]
    );
    let exclude = string_array(&body["exclude"]);
    assert!(exclude.contains(&root.join("node_modules").to_string_lossy().into_owned()));
}

#[test]
fn skip_lib_check_is_forced_only_when_requested() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");
    let closure = Closure::Discovered {
        source_files: vec![a.clone()],
        setup_files: Vec::new(),
    };

    let without = synthesize::synthesize(&config, &closure, &[a.clone()], false).unwrap();
    assert!(read_back(without.path())["compilerOptions"]
        .get("skipLibCheck")
        .is_none());

    let with = synthesize::synthesize(&config, &closure, &[a], true).unwrap();
    assert_eq!(
        read_back(with.path())["compilerOptions"]["skipLibCheck"],
        serde_json::json!(true)
    );
}

#[test]
fn relative_path_options_are_anchored_to_the_original_directory() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(
        &root,
        r#"{ "compilerOptions": { "baseUrl": ".", "typeRoots": ["typings"] } }"#,
    );
    let a = write_file(&root, "src/a.ts", "export {};\n");
    let closure = Closure::Discovered {
        source_files: vec![a.clone()],
        setup_files: Vec::new(),
    };

    let synthetic = synthesize::synthesize(&config, &closure, &[a], false).unwrap();
    let body = read_back(synthetic.path());

    assert_eq!(
        body["compilerOptions"]["baseUrl"],
        serde_json::json!(root.join(".").to_string_lossy())
    );
    assert_eq!(
        string_array(&body["compilerOptions"]["typeRoots"]),
        vec![root.join("typings").to_string_lossy().into_owned()]
    );
}

#[test]
fn synthetic_file_lives_outside_the_project_and_is_removed_on_drop() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = load_config(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");
    let closure = Closure::Discovered {
        source_files: vec![a.clone()],
        setup_files: Vec::new(),
    };

    let synthetic = synthesize::synthesize(&config, &closure, &[a], false).unwrap();
    let path = synthetic.path().to_owned();
    assert!(path.exists());
    assert!(!path.starts_with(&root));

    drop(synthetic);
    assert!(!path.exists());
}
