use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn shrinker_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("shrinker"))
}

fn sibling_class(name: &str) -> String {
    format!(
        r#"{{
            "descriptor": "Lcom/example/{name};",
            "access": ["public"],
            "superType": "Ljava/lang/Object;",
            "methods": [
                {{
                    "name": "<init>", "returnType": "V", "access": ["public", "constructor"],
                    "body": {{ "kind": "code", "instructions": [
                        {{ "op": "argument", "out": 0, "type": "Lcom/example/{name};" }},
                        {{ "op": "invoke", "kind": "direct", "method": "Ljava/lang/Object;-><init>()V", "arguments": [0] }},
                        {{ "op": "return" }}
                    ] }}
                }},
                {{
                    "name": "run", "returnType": "V", "access": ["public"],
                    "body": {{ "kind": "code", "instructions": [
                        {{ "op": "argument", "out": 0, "type": "Lcom/example/{name};" }},
                        {{ "op": "return" }}
                    ] }}
                }}
            ]
        }}"#
    )
}

/// `enum Color { RED }` with its constructor, static initializer and `$VALUES`
const COLOR_CLASS: &str = r#"{
    "descriptor": "Lcom/example/Color;",
    "access": ["public", "final", "enum"],
    "superType": "Ljava/lang/Enum;",
    "fields": [
        { "name": "RED", "type": "Lcom/example/Color;", "access": ["public", "static", "final", "enum"] },
        { "name": "$VALUES", "type": "[Lcom/example/Color;", "access": ["private", "static", "final", "synthetic"] }
    ],
    "methods": [
        {
            "name": "<init>", "parameters": ["Ljava/lang/String;", "I"], "returnType": "V",
            "access": ["private", "constructor"],
            "body": { "kind": "code", "instructions": [
                { "op": "argument", "out": 0, "type": "Lcom/example/Color;" },
                { "op": "argument", "out": 1, "type": "Ljava/lang/String;" },
                { "op": "argument", "out": 2, "type": "I" },
                { "op": "invoke", "kind": "direct", "method": "Ljava/lang/Enum;-><init>(Ljava/lang/String;I)V", "arguments": [0, 1, 2] },
                { "op": "return" }
            ] }
        },
        {
            "name": "<clinit>", "returnType": "V", "access": ["static", "constructor"],
            "body": { "kind": "code", "instructions": [
                { "op": "new-instance", "out": 0, "class": "Lcom/example/Color;" },
                { "op": "const-string", "out": 1, "value": "RED" },
                { "op": "const-number", "out": 2, "value": 0 },
                { "op": "invoke", "kind": "direct", "method": "Lcom/example/Color;-><init>(Ljava/lang/String;I)V", "arguments": [0, 1, 2] },
                { "op": "static-put", "value": 0, "field": "Lcom/example/Color;->RED:Lcom/example/Color;" },
                { "op": "return" }
            ] }
        }
    ]
}"#;

/// Main creates `A` and `B`, calls `run()` on both and reads `Color.RED`
fn program_json() -> String {
    format!(
        r#"{{ "classes": [
            {},
            {},
            {COLOR_CLASS},
            {{
                "descriptor": "Lcom/example/Main;",
                "access": ["public"],
                "superType": "Ljava/lang/Object;",
                "methods": [{{
                    "name": "main", "returnType": "V", "access": ["public", "static"], "pinned": true,
                    "body": {{ "kind": "code", "instructions": [
                        {{ "op": "new-instance", "out": 0, "class": "Lcom/example/A;" }},
                        {{ "op": "invoke", "kind": "direct", "method": "Lcom/example/A;-><init>()V", "arguments": [0] }},
                        {{ "op": "invoke", "kind": "virtual", "method": "Lcom/example/A;->run()V", "arguments": [0] }},
                        {{ "op": "new-instance", "out": 1, "class": "Lcom/example/B;" }},
                        {{ "op": "invoke", "kind": "direct", "method": "Lcom/example/B;-><init>()V", "arguments": [1] }},
                        {{ "op": "invoke", "kind": "virtual", "method": "Lcom/example/B;->run()V", "arguments": [1] }},
                        {{ "op": "static-get", "out": 2, "field": "Lcom/example/Color;->RED:Lcom/example/Color;" }},
                        {{ "op": "return" }}
                    ] }}
                }}]
            }}
        ] }}"#,
        sibling_class("A"),
        sibling_class("B")
    )
}

fn write_program(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("program.json");
    fs::write(&path, program_json()).unwrap();
    path
}

// ============================================================================
// INITIALIZATION AND ARGUMENTS
// ============================================================================

#[test]
fn test_init_creates_config_file() {
    let temp_dir = TempDir::new().unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg("--init")
        .assert()
        .success()
        .stdout(predicate::str::contains("shrinker.json"));

    let config = fs::read_to_string(temp_dir.path().join("shrinker.json")).unwrap();
    assert!(config.contains("optimizationLevel"));
    assert!(config.contains("horizontalMerging"));
    assert!(config.contains("enumUnboxing"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("shrinker.json"), "{}").unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg("--init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_missing_input_fails() {
    let temp_dir = TempDir::new().unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input file"));
}

#[test]
fn test_unknown_level_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-O")
        .arg("9")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown optimization level"));
}

#[test]
fn test_malformed_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("broken.json");
    fs::write(&input, "{ \"classes\": [ ").unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

// ============================================================================
// OPTIMIZATION
// ============================================================================

#[test]
fn test_siblings_are_merged_and_enum_unboxed() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("Lcom/example/A;"));
    assert!(written.contains("class-id-dispatch"));
    assert!(!written.contains("Lcom/example/B;"));
    assert!(!written.contains("Lcom/example/Color;"));
}

#[test]
fn test_output_defaults_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Lcom/example/Main;"))
        .stdout(predicate::str::contains("Lcom/example/B;").not());
}

#[test]
fn test_yaml_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.yaml");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("classes:"));
    assert!(!written.trim_start().starts_with('{'));
}

#[test]
fn test_o0_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("-O")
        .arg("0")
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("Lcom/example/B;"));
    assert!(written.contains("Lcom/example/Color;"));
}

#[test]
fn test_o1_keeps_enums_boxed() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("-O1")
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(!written.contains("Lcom/example/B;"));
    assert!(written.contains("Lcom/example/Color;"));
}

#[test]
fn test_no_horizontal_merging_flag() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--no-horizontal-merging")
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("Lcom/example/B;"));
    assert!(!written.contains("class-id-dispatch"));
}

#[test]
fn test_config_file_disables_enum_unboxing() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");
    let config = temp_dir.path().join("custom.yaml");
    fs::write(&config, "enumUnboxing:\n  enable: false\n").unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("Lcom/example/Color;"));
    assert!(!written.contains("Lcom/example/B;"));
}

#[test]
fn test_default_config_file_is_picked_up() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");
    fs::write(
        temp_dir.path().join("shrinker.json"),
        r#"{ "horizontalMerging": { "enable": false } }"#,
    )
    .unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("Lcom/example/B;"));
}

#[test]
fn test_invalid_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let config = temp_dir.path().join("bad.json");
    fs::write(&config, r#"{ "optimizationLevel": "O7" }"#).unwrap();

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}

// ============================================================================
// REPORTING
// ============================================================================

#[test]
fn test_mapping_file_lists_merged_classes() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");
    let mapping = temp_dir.path().join("mapping.txt");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--mapping")
        .arg(&mapping)
        .assert()
        .success();

    let mapping = fs::read_to_string(&mapping).unwrap();
    assert!(mapping.contains("com.example.A -> com.example.A:"));
    assert!(mapping.contains("# merged: com.example.B"));
    assert!(mapping.contains("void com.example.B.run() -> run$B"));
}

#[test]
fn test_enum_unboxing_debug_logs() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_program(&temp_dir);
    let output = temp_dir.path().join("out.json");

    shrinker_cmd()
        .current_dir(&temp_dir)
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--enum-unboxing-debug-logs")
        .assert()
        .success()
        .stderr(predicate::str::contains("Unboxed enums (Unboxing succeeded 1): com.example.Color"))
        .stderr(predicate::str::contains("Boxed enums (Unboxing failed 0)"));
}
