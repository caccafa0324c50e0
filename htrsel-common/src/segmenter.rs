//! Bridge to external line-segmentation programs
//!
//! Models are opaque commands configured as argv templates. A run writes
//! `{model}_{i}.{ext}` images into `{basename}_{model}/`; this module only
//! prepares the folder, substitutes the template and checks the exit status.

use crate::config::{InteractiveConfig, ModelConfig, SegmentationConfig};
use crate::db::models::Document;
use crate::media;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Placeholder values for one model invocation
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub image: PathBuf,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub model: String,
    pub model_file: String,
    pub padding: u32,
    pub ext: String,
}

impl ModelRun {
    fn value(&self, key: &str) -> Option<String> {
        Some(match key {
            "image" => self.image.display().to_string(),
            "output_dir" => self.output_dir.display().to_string(),
            "prefix" => self.prefix.clone(),
            "model" => self.model.clone(),
            "model_file" => self.model_file.clone(),
            "padding" => self.padding.to_string(),
            "ext" => self.ext.clone(),
            _ => return None,
        })
    }
}

/// Replace `{name}` placeholders in each argument; unknown names are kept
pub fn substitute<F>(template: &[String], lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    template
        .iter()
        .map(|arg| {
            let mut out = String::with_capacity(arg.len());
            let mut rest = arg.as_str();
            while let Some(open) = rest.find('{') {
                out.push_str(&rest[..open]);
                let after = &rest[open + 1..];
                match after.find('}') {
                    Some(close) => {
                        let key = &after[..close];
                        match lookup(key) {
                            Some(value) => out.push_str(&value),
                            None => {
                                out.push('{');
                                out.push_str(key);
                                out.push('}');
                            }
                        }
                        rest = &after[close + 1..];
                    }
                    None => {
                        out.push_str(&rest[open..]);
                        rest = "";
                    }
                }
            }
            out.push_str(rest);
            out
        })
        .collect()
}

/// Expand a model's argv template for one run
pub fn render_command(model: &ModelConfig, run: &ModelRun) -> Result<Vec<String>> {
    let argv = substitute(&model.command, |key| run.value(key));
    if argv.is_empty() || argv[0].trim().is_empty() {
        return Err(Error::Config(format!("Model '{}' has an empty command", model.name)));
    }
    Ok(argv)
}

/// Run an argv to completion off the async runtime
pub async fn run_command(argv: Vec<String>) -> Result<()> {
    let program = argv.first().cloned().unwrap_or_default();
    debug!(command = ?argv, "Running external command");

    let output = tokio::task::spawn_blocking(move || {
        Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .output()
    })
    .await
    .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    .map_err(|e| Error::Process(format!("Failed to start {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Process(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Run one model over a document's page image
///
/// Returns the candidate folder. The folder is created before the call.
pub async fn run_model(
    media_root: &Path,
    doc: &Document,
    model: &ModelConfig,
    padding: u32,
) -> Result<PathBuf> {
    let basename = doc
        .basename()
        .ok_or_else(|| Error::NotFound(format!("File of document {}", doc.id)))?;
    let image = media::page_image(media_root, doc)
        .ok_or_else(|| Error::NotFound(format!("Page image for '{}'", basename)))?;
    let output_dir = media::candidate_dir(media_root, &basename, &model.name);
    std::fs::create_dir_all(&output_dir)?;

    let run = ModelRun {
        ext: media::extension_of(&image),
        image,
        output_dir: output_dir.clone(),
        prefix: model.name.clone(),
        model: model.name.clone(),
        model_file: model.model_file.clone(),
        padding,
    };
    run_command(render_command(model, &run)?).await?;

    info!(basename = %basename, model = %model.name, "Segmentation finished");
    Ok(output_dir)
}

/// Outcome of running every model over a batch of documents
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run every configured model over one document; failures are logged
pub async fn segment_document(
    media_root: &Path,
    config: &SegmentationConfig,
    doc: &Document,
    report: &mut SegmentReport,
) {
    for model in &config.models {
        match run_model(media_root, doc, model, config.padding).await {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                warn!(document_id = doc.id, model = %model.name, "Segmentation failed: {}", e);
                report.failed += 1;
            }
        }
    }
}

/// Environment for the interactive segmenter
///
/// Drops `PYTHON*`, `QT_*` and anything whose value mentions `cv2`, then
/// puts the virtualenv's `bin` first on `PATH`.
pub fn sanitized_env<I>(vars: I, venv: Option<&Path>) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(k, v)| !k.starts_with("PYTHON") && !k.starts_with("QT_") && !v.contains("cv2"))
        .collect();

    if let Some(venv) = venv {
        let bin = venv.join("bin").display().to_string();
        match env.iter_mut().find(|(k, _)| k == "PATH") {
            Some((_, path)) => *path = format!("{}:{}", bin, path),
            None => env.push(("PATH".to_string(), format!("{}:", bin))),
        }
    }
    env
}

/// Start the interactive segmenter for a page image and return immediately
pub fn launch_interactive(config: &InteractiveConfig, image: &Path) -> Result<u32> {
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    let env = sanitized_env(vars, config.venv.as_deref());

    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .arg(image)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command
        .spawn()
        .map_err(|e| Error::Process(format!("Failed to start {}: {}", config.program, e)))?;
    let pid = child.id();

    // Reaped on a detached thread; the caller does not wait
    std::thread::spawn(move || {
        let _ = child.wait();
    });

    info!(pid, image = %image.display(), "Launched interactive segmenter");
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let run = ModelRun {
            image: PathBuf::from("/m/p1.jpg"),
            output_dir: PathBuf::from("/m/p1_blla"),
            prefix: "blla".to_string(),
            model: "blla".to_string(),
            model_file: "blla.mlmodel".to_string(),
            padding: 12,
            ext: "jpg".to_string(),
        };
        let model = ModelConfig {
            name: "blla".to_string(),
            model_file: "blla.mlmodel".to_string(),
            command: strings(&["seg", "{image}", "--out={output_dir}", "-p", "{padding}", "{unknown}", "{ext"]),
        };
        assert_eq!(
            render_command(&model, &run).unwrap(),
            strings(&["seg", "/m/p1.jpg", "--out=/m/p1_blla", "-p", "12", "{unknown}", "{ext"])
        );
    }

    #[test]
    fn empty_command_is_config_error() {
        let model = ModelConfig {
            name: "x".to_string(),
            model_file: String::new(),
            command: Vec::new(),
        };
        let run = ModelRun {
            image: PathBuf::new(),
            output_dir: PathBuf::new(),
            prefix: String::new(),
            model: String::new(),
            model_file: String::new(),
            padding: 0,
            ext: String::new(),
        };
        assert!(matches!(render_command(&model, &run), Err(Error::Config(_))));
    }

    #[test]
    fn environment_is_sanitized() {
        let vars = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("PYTHONPATH".to_string(), "/x".to_string()),
            ("QT_PLUGIN_PATH".to_string(), "/y".to_string()),
            ("LD_LIBRARY_PATH".to_string(), "/site/cv2/lib".to_string()),
            ("HOME".to_string(), "/home/op".to_string()),
        ];
        let env = sanitized_env(vars, Some(Path::new("/venv")));
        assert_eq!(
            env,
            vec![
                ("PATH".to_string(), "/venv/bin:/usr/bin".to_string()),
                ("HOME".to_string(), "/home/op".to_string()),
            ]
        );
    }

    fn doc(file: &str) -> Document {
        Document {
            id: 1,
            file: Some(file.to_string()),
            notebook_id: None,
            page: None,
            notebook_name: None,
        }
    }

    #[tokio::test]
    async fn missing_page_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let model = &SegmentationConfig::default().models[0];
        let err = run_model(dir.path(), &doc("ghost.jpg"), model, 10).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn model_runs_on_the_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.JPG"), b"jpg").unwrap();
        let model = ModelConfig {
            name: "fake".to_string(),
            model_file: String::new(),
            command: strings(&["sh", "-c", "cp \"$0\" \"$1/$2_0.$3\"", "{image}", "{output_dir}", "{prefix}", "{ext}"]),
        };

        let out = run_model(dir.path(), &doc("scan.JPG"), &model, 0).await.unwrap();
        assert_eq!(out, dir.path().join("scan_fake"));
        assert!(out.join("fake_0.JPG").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_process_error() {
        let err = run_command(strings(&["sh", "-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            Error::Process(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {}", other),
        }
    }
}
