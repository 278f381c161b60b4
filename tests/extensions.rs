use tsc_scoped::extensions::{
    is_candidate_input, is_declaration_file, matches_source_extension, source_extensions,
};
use tsc_scoped::path::is_glob_pattern;

#[test]
fn typescript_sources_always_match() {
    for file in ["a.ts", "a.tsx", "a.mts", "a.cts"] {
        assert!(matches_source_extension(file, false), "{}", file);
    }
}

#[test]
fn javascript_sources_are_gated_by_policy() {
    for file in ["a.js", "a.jsx", "a.mjs", "a.cjs"] {
        assert!(!matches_source_extension(file, false), "{}", file);
        assert!(matches_source_extension(file, true), "{}", file);
    }
}

#[test]
fn declaration_files_match_regardless_of_policy() {
    for file in ["globals.d.ts", "globals.d.mts", "globals.d.cts"] {
        assert!(matches_source_extension(file, false), "{}", file);
        assert!(is_declaration_file(file), "{}", file);
    }
}

#[test]
fn unrecognized_extensions_classify_false() {
    assert!(!matches_source_extension("styles.css", true));
    assert!(!matches_source_extension("README.md", true));
}

#[test]
fn extensionless_input_is_a_candidate_directory() {
    assert!(is_candidate_input("src", false));
    assert!(is_candidate_input("packages/foo", false));
}

#[test]
fn directory_expansion_extensions_follow_policy() {
    let without_js = source_extensions(false);
    assert!(without_js.contains(&".ts"));
    assert!(without_js.contains(&".d.ts"));
    assert!(!without_js.contains(&".js"));

    let with_js = source_extensions(true);
    assert!(with_js.contains(&".js"));
    assert!(with_js.contains(&".cjs"));
}

#[test]
fn glob_detection_ignores_legal_filename_characters() {
    assert!(!is_glob_pattern("src/file.(test).ts"));
    assert!(!is_glob_pattern("src/$money.ts"));
    assert!(is_glob_pattern("src/**/*.ts"));
    assert!(is_glob_pattern("src/file?.ts"));
    assert!(is_glob_pattern("src/{a,b}.ts"));
}

#[test]
fn escaped_metacharacters_are_not_glob_syntax() {
    assert!(!is_glob_pattern(r"src/\*.ts"));
    assert!(is_glob_pattern(r"src/\**.ts"));
}
