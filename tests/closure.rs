use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use tempfile::TempDir;
use tsc_scoped::closure::{
    self, Closure, ClosureCache, FileLister, ListFilesError, TscFileLister,
};
use tsc_scoped::config::{self, EffectiveConfig};

fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn config_at(root: &Path, contents: &str) -> EffectiveConfig {
    let config_path = write_file(root, "tsconfig.json", contents);
    config::load_effective_config(&config_path).unwrap()
}

/// Lister returning a fixed file set, counting invocations so cache behavior
/// is observable.
struct StubLister {
    files: Vec<PathBuf>,
    calls: AtomicUsize,
}

impl StubLister {
    fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileLister for StubLister {
    fn list_program_files(
        &self,
        _project: &Path,
        _cwd: &Path,
    ) -> Result<Vec<PathBuf>, ListFilesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.clone())
    }
}

fn source_files(closure: &Closure) -> &[PathBuf] {
    match closure {
        Closure::Discovered { source_files, .. } => source_files,
        Closure::Fallback => panic!("expected a discovered closure"),
    }
}

#[test]
fn discovered_closure_keeps_siblings_and_drops_external_files() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": { "strict": true } }"#);
    let a = write_file(&root, "src/a.ts", "import './b';\n");
    let b = write_file(&root, "src/b.ts", "export {};\n");
    let vendored = write_file(&root, "node_modules/pkg/index.d.ts", "export {};\n");

    let lister = StubLister::new(vec![
        a.clone(),
        b.clone(),
        vendored,
        // Library declarations shipped with the compiler live outside the
        // project and must not leak into the closure.
        PathBuf::from("/usr/lib/node_modules/typescript/lib/lib.es5.d.ts"),
    ]);
    let cache = ClosureCache::new();
    let closure = closure::discover(&config, &[a.clone()], &[], &root, &cache, &lister);

    let files = source_files(&closure);
    assert!(files.contains(&a));
    assert!(files.contains(&b));
    assert!(!files.iter().any(|file| file.to_string_lossy().contains("node_modules")));
    let mut sorted = files.to_vec();
    sorted.sort_unstable();
    assert_eq!(files, &sorted[..]);
}

#[test]
fn roots_survive_even_when_the_compiler_omits_them() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let lister = StubLister::new(Vec::new());
    let cache = ClosureCache::new();
    let closure = closure::discover(&config, &[a.clone()], &[], &root, &cache, &lister);

    assert!(source_files(&closure).contains(&a));
}

#[test]
fn lister_failure_degrades_to_fallback() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    // A lister whose compiler cannot even be spawned.
    let lister = TscFileLister {
        command: "tsc-scoped-no-such-binary".to_owned(),
    };
    let cache = ClosureCache::new();
    let closure = closure::discover(&config, &[a], &[], &root, &cache, &lister);
    assert_eq!(closure, Closure::Fallback);
}

#[test]
fn unchanged_inputs_hit_the_cache() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let lister = StubLister::new(vec![a.clone()]);
    let cache = ClosureCache::new();
    let first = closure::discover(&config, &[a.clone()], &[], &root, &cache, &lister);
    let second = closure::discover(&config, &[a], &[], &root, &cache, &lister);

    assert_eq!(first, second);
    assert_eq!(lister.calls(), 1);
}

#[test]
fn new_ambient_declaration_invalidates_the_cache() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let lister = StubLister::new(vec![a.clone()]);
    let cache = ClosureCache::new();
    closure::discover(&config, &[a.clone()], &[], &root, &cache, &lister);

    // The new file's mtime is invisible to the cached set, so invalidation
    // has to come from the ambient file count.
    let globals = write_file(&root, "src/globals.d.ts", "declare const FLAG: boolean;\n");
    let second = closure::discover(&config, &[a], &[], &root, &cache, &lister);

    assert_eq!(lister.calls(), 2);
    assert!(source_files(&second).contains(&globals));
}

#[test]
fn modified_source_invalidates_the_cache() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let lister = StubLister::new(vec![a.clone()]);
    let cache = ClosureCache::new();
    closure::discover(&config, &[a.clone()], &[], &root, &cache, &lister);

    thread::sleep(Duration::from_millis(50));
    fs::write(&a, "export const changed = true;\n").unwrap();
    closure::discover(&config, &[a], &[], &root, &cache, &lister);

    assert_eq!(lister.calls(), 2);
}

#[test]
fn test_roots_pull_in_framework_setup_files() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let spec = write_file(&root, "tests/user.test.ts", "export {};\n");
    let conventional = write_file(&root, "tests/setup.ts", "export {};\n");
    let from_config = write_file(&root, "config/jest-setup.ts", "export {};\n");
    write_file(
        &root,
        "jest.config.js",
        r#"module.exports = { setupFilesAfterEach: ["<rootDir>/config/jest-setup.ts"] };"#,
    );

    let lister = StubLister::new(vec![spec.clone()]);
    let cache = ClosureCache::new();
    let closure = closure::discover(&config, &[spec], &[], &root, &cache, &lister);

    match closure {
        Closure::Discovered {
            source_files,
            setup_files,
        } => {
            assert!(setup_files.contains(&conventional));
            assert!(setup_files.contains(&from_config));
            assert!(source_files.contains(&conventional));
            assert!(source_files.contains(&from_config));
        }
        Closure::Fallback => panic!("expected a discovered closure"),
    }
}

#[test]
fn explicit_includes_replace_the_setup_heuristic() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(&root, r#"{ "compilerOptions": {} }"#);
    let spec = write_file(&root, "tests/user.test.ts", "export {};\n");
    write_file(&root, "tests/setup.ts", "export {};\n");
    let extra = write_file(&root, "typings/env.d.ts", "declare const ENV: string;\n");

    let lister = StubLister::new(vec![spec.clone()]);
    let cache = ClosureCache::new();
    let closure = closure::discover(
        &config,
        &[spec],
        &[extra.clone()],
        &root,
        &cache,
        &lister,
    );

    match closure {
        Closure::Discovered {
            source_files,
            setup_files,
        } => {
            assert!(setup_files.is_empty());
            assert!(source_files.contains(&extra));
        }
        Closure::Fallback => panic!("expected a discovered closure"),
    }
}

/// Lister that records the probe configuration it was handed.
struct CapturingLister {
    probe: Mutex<Option<serde_json::Value>>,
}

impl FileLister for CapturingLister {
    fn list_program_files(
        &self,
        project: &Path,
        _cwd: &Path,
    ) -> Result<Vec<PathBuf>, ListFilesError> {
        let body = serde_json::from_str(&fs::read_to_string(project).unwrap()).unwrap();
        *self.probe.lock().unwrap() = Some(body);
        Ok(Vec::new())
    }
}

#[test]
fn probe_configuration_anchors_relative_path_options() {
    let tree = TempDir::new().unwrap();
    let root = tree.path().canonicalize().unwrap();
    let config = config_at(
        &root,
        r#"{ "compilerOptions": { "baseUrl": ".", "typeRoots": ["typings"] } }"#,
    );
    let a = write_file(&root, "src/a.ts", "export {};\n");

    let lister = CapturingLister {
        probe: Mutex::new(None),
    };
    let cache = ClosureCache::new();
    closure::discover(&config, &[a], &[], &root, &cache, &lister);

    let probe = lister.probe.lock().unwrap().clone().unwrap();
    // The probe lives in the temp directory; relative options resolving
    // against it would skew the listing.
    assert_eq!(
        probe["compilerOptions"]["baseUrl"],
        serde_json::json!(root.join(".").to_string_lossy())
    );
    assert_eq!(
        probe["compilerOptions"]["typeRoots"][0],
        serde_json::json!(root.join("typings").to_string_lossy())
    );
    assert_eq!(probe["compilerOptions"]["noEmit"], serde_json::json!(true));
}

#[test]
fn imports_outside_the_package_are_kept_while_default_libs_are_dropped() {
    let package_tree = TempDir::new().unwrap();
    let package = package_tree.path().canonicalize().unwrap();
    let shared_tree = TempDir::new().unwrap();
    let shared_root = shared_tree.path().canonicalize().unwrap();

    let config = config_at(&package, r#"{ "compilerOptions": {} }"#);
    let a = write_file(&package, "src/a.ts", "import '../shared/util';\n");
    let shared = write_file(&shared_root, "shared/util.ts", "export {};\n");

    let lister = StubLister::new(vec![
        a.clone(),
        shared.clone(),
        PathBuf::from("/opt/typescript/lib/lib.es2020.d.ts"),
    ]);
    let cache = ClosureCache::new();
    let closure = closure::discover(&config, &[a], &[], &package, &cache, &lister);

    let files = source_files(&closure);
    // A cross-package dependency is a real part of the program.
    assert!(files.contains(&shared));
    assert!(!files
        .iter()
        .any(|file| file.ends_with("lib.es2020.d.ts")));
}
