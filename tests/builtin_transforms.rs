use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pipedag::dag::TransformRef;
use pipedag::engine::{Orchestrator, RunOptions};
use pipedag::exec::builtin::revision::{
    content_hash, load_manifest, revisioned_name, rewrite_references, Manifest,
};
use pipedag::exec::builtin::shell::command_env;
use pipedag::exec::builtin::{Clean, CopyFiles, RevReplace, Revision, Shell};
use pipedag::exec::{Transform, TransformOptions, TransformRegistry, WorkRequest};
use pipedag::fs::mock::MockFileSystem;
use pipedag::fs::{expand_inputs, FileSystem, RealFileSystem};
use pipedag_test_utils::builders::TaskTableBuilder;
use pipedag_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn request(
    root: &Path,
    task: &str,
    inputs: &[&str],
    output_dir: Option<&str>,
    options: TransformOptions,
) -> WorkRequest {
    let mut work = TransformRef::new("builtin");
    work.inputs = inputs.iter().map(|s| s.to_string()).collect();
    work.output_dir = output_dir.map(PathBuf::from);
    work.options = options;
    WorkRequest::new(task.to_string(), 1, root, &work)
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn real_fs() -> Arc<dyn FileSystem> {
    Arc::new(RealFileSystem)
}

#[test]
fn expand_inputs_respects_separators_and_negations() {
    let fs = MockFileSystem::new();
    fs.add_file("/p/src/js/app.js", "a");
    fs.add_file("/p/src/js/app.min.js", "m");
    fs.add_file("/p/src/js/views/home.js", "h");
    fs.add_file("/p/src/css/app.css", "c");
    let root = Path::new("/p");

    let shallow = expand_inputs(&fs, root, &["src/js/*.js".to_string()]).unwrap();
    let names: Vec<_> = shallow.iter().map(|f| f.relative.clone()).collect();
    assert_eq!(names, vec![PathBuf::from("app.js"), PathBuf::from("app.min.js")]);

    let deep = expand_inputs(
        &fs,
        root,
        &["src/js/**/*.js".to_string(), "!src/js/**/*.min.js".to_string()],
    )
    .unwrap();
    let names: Vec<_> = deep.iter().map(|f| f.relative.clone()).collect();
    assert_eq!(
        names,
        vec![PathBuf::from("app.js"), PathBuf::from("views/home.js")]
    );
    assert_eq!(deep[1].path, PathBuf::from("/p/src/js/views/home.js"));

    let literal_dir = expand_inputs(&fs, root, &["src/css".to_string()]).unwrap();
    assert_eq!(literal_dir.len(), 1);
    assert_eq!(literal_dir[0].relative, PathBuf::from("app.css"));

    assert!(expand_inputs(&fs, root, &["missing/**".to_string()])
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn copy_keeps_layout_below_the_literal_base() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/images/logo.png", "png");
    write(root, "src/images/icons/star.png", "star");
    write(root, "src/images/notes.txt", "skip");

    let req = request(
        root,
        "images",
        &["src/images/**/*.png"],
        Some("dist/img"),
        TransformOptions::default(),
    );
    CopyFiles::new(real_fs()).run(req).await.unwrap();

    assert_eq!(fs::read_to_string(root.join("dist/img/logo.png")).unwrap(), "png");
    assert_eq!(
        fs::read_to_string(root.join("dist/img/icons/star.png")).unwrap(),
        "star"
    );
    assert!(!root.join("dist/img/notes.txt").exists());
}

#[tokio::test]
async fn copy_can_change_the_extension() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/pages/index.tpl", "<html></html>");

    let req = request(
        root,
        "pages",
        &["src/pages/*.tpl"],
        Some("dist"),
        TransformOptions {
            extension: Some(".html".to_string()),
            ..TransformOptions::default()
        },
    );
    CopyFiles::new(real_fs()).run(req).await.unwrap();

    assert!(root.join("dist/index.html").is_file());
}

#[tokio::test]
async fn copy_without_output_dir_fails() {
    let dir = TempDir::new().unwrap();
    let req = request(
        dir.path(),
        "images",
        &["src/**"],
        None,
        TransformOptions::default(),
    );
    let err = CopyFiles::new(real_fs()).run(req).await.unwrap_err();
    assert_eq!(err.message(), "task 'images' has no output_dir");
}

#[tokio::test]
async fn clean_removes_trees_and_globbed_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "dist/css/app.css", "c");
    write(root, "build/app.js", "j");
    write(root, "build/app.js.map", "m");
    write(root, "src/app.js", "keep");

    let req = request(
        root,
        "clean",
        &["dist", "build/**/*.map", "never-created"],
        None,
        TransformOptions::default(),
    );
    Clean::new(real_fs()).run(req).await.unwrap();

    assert!(!root.join("dist").exists());
    assert!(!root.join("build/app.js.map").exists());
    assert!(root.join("build/app.js").exists());
    assert!(root.join("src/app.js").exists());
}

#[tokio::test]
async fn clean_refuses_the_project_root() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/app.js", "keep");

    let req = request(dir.path(), "clean", &["./"], None, TransformOptions::default());
    let err = Clean::new(real_fs()).run(req).await.unwrap_err();

    assert!(err.message().contains("refusing to clean the project root"));
    assert!(dir.path().join("src/app.js").exists());
}

#[test]
fn revisioned_names_insert_the_hash_before_the_extension() {
    assert_eq!(
        revisioned_name(Path::new("css/app.css"), "0123456789"),
        PathBuf::from("css/app-0123456789.css")
    );
    assert_eq!(
        revisioned_name(Path::new("LICENSE"), "abc"),
        PathBuf::from("LICENSE-abc")
    );
    let hash = content_hash(b"body{}");
    assert_eq!(hash.len(), 10);
    assert_eq!(hash, content_hash(b"body{}"));
    assert_ne!(hash, content_hash(b"body{ }"));
}

#[tokio::test]
async fn revision_writes_hashed_files_and_manifest() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/css/app.css", "body{}");
    write(root, "src/js/app.js", "run()");

    let req = request(
        root,
        "revision",
        &["src/**/*.{css,js}"],
        Some("dist"),
        TransformOptions::default(),
    );
    Revision::new(real_fs()).run(req).await.unwrap();

    let css = format!("css/app-{}.css", content_hash(b"body{}"));
    let js = format!("js/app-{}.js", content_hash(b"run()"));
    assert_eq!(fs::read_to_string(root.join("dist").join(&css)).unwrap(), "body{}");
    assert_eq!(fs::read_to_string(root.join("dist").join(&js)).unwrap(), "run()");

    let manifest = load_manifest(&RealFileSystem, &root.join("dist/rev-manifest.json")).unwrap();
    let expected: Manifest = [
        ("css/app.css".to_string(), css),
        ("js/app.js".to_string(), js),
    ]
    .into_iter()
    .collect();
    assert_eq!(manifest, expected);
}

#[tokio::test]
async fn revision_without_cache_busting_writes_identity_manifest() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/css/app.css", "body{}");

    let req = request(
        root,
        "revision",
        &["src/**/*.css"],
        Some("dist"),
        TransformOptions {
            cache_busting: Some(false),
            manifest: Some(PathBuf::from("manifests/dev.json")),
            ..TransformOptions::default()
        },
    );
    Revision::new(real_fs()).run(req).await.unwrap();

    assert!(root.join("dist/css/app.css").is_file());
    let manifest = load_manifest(&RealFileSystem, &root.join("manifests/dev.json")).unwrap();
    assert_eq!(manifest["css/app.css"], "css/app.css");
}

#[test]
fn rewrite_prefers_longest_key_and_never_rewrites_twice() {
    let manifest: Manifest = [
        ("app.js".to_string(), "app-1111111111.js".to_string()),
        ("js/app.js".to_string(), "js/app-2222222222.js".to_string()),
        ("same.css".to_string(), "same.css".to_string()),
    ]
    .into_iter()
    .collect();

    let html = r#"<script src="js/app.js"></script><script src="app.js"></script><link href="same.css">"#;
    assert_eq!(
        rewrite_references(html, &manifest),
        r#"<script src="js/app-2222222222.js"></script><script src="app-1111111111.js"></script><link href="same.css">"#
    );
}

#[tokio::test]
async fn rev_replace_rewrites_text_files_into_output_dir() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "dist/rev-manifest.json",
        r#"{"css/app.css": "css/app-abcdef0123.css"}"#,
    );
    write(root, "src/index.html", r#"<link href="css/app.css">"#);
    write(root, "src/logo.png", "css/app.css");

    let req = request(
        root,
        "rev-replace",
        &["src/*"],
        Some("dist"),
        TransformOptions::default(),
    );
    RevReplace::new(real_fs()).run(req).await.unwrap();

    assert_eq!(
        fs::read_to_string(root.join("dist/index.html")).unwrap(),
        r#"<link href="css/app-abcdef0123.css">"#
    );
    assert!(!root.join("dist/logo.png").exists(), "binary files are skipped");
    assert_eq!(
        fs::read_to_string(root.join("src/index.html")).unwrap(),
        r#"<link href="css/app.css">"#
    );
}

#[tokio::test]
async fn rev_replace_without_manifest_fails() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/index.html", "x");
    let req = request(
        dir.path(),
        "rev-replace",
        &["src/*.html"],
        Some("dist"),
        TransformOptions::default(),
    );
    let err = RevReplace::new(real_fs()).run(req).await.unwrap_err();
    assert!(err.message().contains("reading manifest"));
}

#[test]
fn command_env_exports_request_fields() {
    let options = TransformOptions {
        compression_level: Some(9),
        cache_busting: Some(false),
        browsers: Some(vec!["last 2 versions".to_string(), "> 1%".to_string()]),
        manifest: Some(PathBuf::from("dist/rev-manifest.json")),
        env: [("NODE_ENV".to_string(), "production".to_string())]
            .into_iter()
            .collect(),
        ..TransformOptions::default()
    };
    let req = request(
        Path::new("/site"),
        "compileStyles",
        &["src/scss/app.scss", "src/scss/print.scss"],
        Some("dist/css"),
        options,
    );

    let env = command_env(&req);
    assert_eq!(env["PIPEDAG_TASK"], "compileStyles");
    assert_eq!(env["PIPEDAG_INPUTS"], "src/scss/app.scss src/scss/print.scss");
    assert_eq!(
        PathBuf::from(&env["PIPEDAG_OUTPUT_DIR"]),
        PathBuf::from("/site/dist/css")
    );
    assert_eq!(env["PIPEDAG_COMPRESSION_LEVEL"], "9");
    assert_eq!(env["PIPEDAG_CACHE_BUSTING"], "false");
    assert_eq!(env["PIPEDAG_BROWSERS"], "last 2 versions,> 1%");
    assert_eq!(
        PathBuf::from(&env["PIPEDAG_MANIFEST"]),
        PathBuf::from("/site/dist/rev-manifest.json")
    );
    assert_eq!(env["NODE_ENV"], "production");
}

#[tokio::test]
async fn shell_without_cmd_fails() {
    let req = request(Path::new("."), "compile", &[], None, TransformOptions::default());
    let err = Shell.run(req).await.unwrap_err();
    assert!(err.message().contains("without `cmd`"));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_runs_in_root_with_request_environment() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let options = TransformOptions {
        cmd: Some(r#"printf '%s|%s|%s' "$PIPEDAG_TASK" "$PIPEDAG_COMPRESSION_LEVEL" "$GREETING" > out.txt"#.to_string()),
        compression_level: Some(3),
        env: [("GREETING".to_string(), "hi".to_string())]
            .into_iter()
            .collect(),
        ..TransformOptions::default()
    };
    let req = request(dir.path(), "minify", &[], None, options);

    Shell.run(req).await.unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "minify|3|hi"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn shell_failure_carries_exit_code_and_stderr() {
    let dir = TempDir::new().unwrap();
    let options = TransformOptions {
        cmd: Some("echo 'Unexpected token' >&2; exit 3".to_string()),
        ..TransformOptions::default()
    };
    let req = request(dir.path(), "compileScripts", &[], None, options);

    let err = Shell.run(req).await.unwrap_err();
    assert!(err.message().contains("exited with code 3"), "{err}");
    assert!(err.message().contains("Unexpected token"), "{err}");
}

#[tokio::test]
async fn builtins_chain_into_a_production_build() {
    init_tracing();
    let mock = MockFileSystem::new();
    mock.add_file("/site/dist/stale.css", "old");
    mock.add_file("/site/src/css/app.css", "body{}");
    mock.add_file("/site/src/index.html", r#"<link href="css/app.css">"#);

    let registry = TransformRegistry::with_builtins(Arc::new(mock.clone()));

    let mut clean = TransformRef::new("clean");
    clean.inputs = vec!["dist".to_string()];
    let mut styles = TransformRef::new("revision");
    styles.inputs = vec!["src/**/*.css".to_string()];
    styles.output_dir = Some(PathBuf::from("dist"));
    let mut html = TransformRef::new("rev-replace");
    html.inputs = vec!["src/*.html".to_string()];
    html.output_dir = Some(PathBuf::from("dist"));

    let table = TaskTableBuilder::new()
        .with_ref("clean", &[], clean)
        .with_ref("styles", &["clean"], styles)
        .with_ref("html", &["styles"], html)
        .build();
    let orch = Orchestrator::new(&table, registry, "/site", RunOptions::default()).unwrap();

    let report = with_timeout(orch.run("html", CancellationToken::new()))
        .await
        .unwrap();
    assert!(report.is_success(), "{}", report.render());

    let hashed = format!("css/app-{}.css", content_hash(b"body{}"));
    let files = mock.files();
    assert!(!files.contains(&PathBuf::from("/site/dist/stale.css")));
    assert!(files.contains(&Path::new("/site/dist").join(&hashed)));
    assert_eq!(
        mock.read_to_string(Path::new("/site/dist/index.html")).unwrap(),
        format!(r#"<link href="{hashed}">"#)
    );
}
