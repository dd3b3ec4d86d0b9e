use crate::engine::{JobError, SanitizerClient};
use crate::model::{ClientConfig, InfoEvent, JobEvent, JobHandle, JobId, JobStatus, Operation};
use crate::orchestrator::{process_job_completion, CompletionOptions, JobController};
use crate::preview::{self, DEFAULT_PREVIEW_ROWS};
use crate::session::{SelectedFile, UploadState};
use crate::view::{self, DiffView, ResultView, SessionView};
use crate::{storage, text_summary};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_DIFF_ROWS: usize = 20;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Results go to stdout; progress and notices go to stderr unless silenced.
#[derive(Clone)]
struct Output {
    tx: mpsc::UnboundedSender<OutputLine>,
    json: bool,
    silent: bool,
}

impl Output {
    fn line(&self, msg: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stdout(msg.into()));
    }

    fn notice(&self, msg: impl Into<String>) {
        if !self.silent {
            let _ = self.tx.send(OutputLine::Stderr(msg.into()));
        }
    }

    /// Print `value` as JSON in `--json` mode, otherwise its text lines.
    fn render<T: Serialize>(&self, value: &T, lines: impl FnOnce(&T) -> Vec<String>) -> Result<()> {
        if self.json {
            self.line(serde_json::to_string_pretty(value)?);
        } else {
            for l in lines(value) {
                self.line(l);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "csv-sanitizer",
    version,
    about = "Client for the batch CSV sanitization service"
)]
pub struct Cli {
    /// Base URL of the sanitizer service
    #[arg(long, global = true, env = "SANITIZER_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Interval between job status checks
    #[arg(long, global = true, default_value = "2s")]
    pub poll_interval: humantime::Duration,

    /// Give up waiting for a job after this long (0s waits forever)
    #[arg(long, global = true, default_value = "30m")]
    pub max_wait: humantime::Duration,

    /// Per-request timeout
    #[arg(long, global = true, default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress progress and notices; only results and errors are printed
    #[arg(long, global = true)]
    pub silent: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Check whether the service is reachable
    Health,
    /// Show the first rows and the columns of a CSV file
    Preview {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },
    /// Submit a CSV file for sanitization and wait for the result
    Sanitize(SanitizeArgs),
    /// Show a job's status
    Status {
        id: JobId,
        /// Keep polling until the job finishes
        #[arg(long)]
        watch: bool,
    },
    /// Show the stored output (or input) file of a job
    JobPreview {
        id: JobId,
        /// Preview the uploaded input instead of the sanitized output
        #[arg(long)]
        input: bool,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },
    /// Show original vs sanitized values of a finished job
    Diff {
        id: JobId,
        #[arg(long, default_value_t = DEFAULT_DIFF_ROWS)]
        rows: usize,
    },
    /// Download a job's sanitized file
    Download {
        id: JobId,
        /// Target file or directory (default: the downloads directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Ask the service to stop a running job
    Stop { id: JobId },
    /// Restart a failed or stopped job
    Restart {
        id: JobId,
        #[arg(long)]
        watch: bool,
    },
    /// List recent jobs
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Show locally saved job summaries instead of the service's audit log
        #[arg(long)]
        local: bool,
    },
    /// Aggregate job statistics from the service
    Stats,
}

#[derive(Debug, Args, Clone)]
pub struct SanitizeArgs {
    /// CSV file to sanitize
    pub file: PathBuf,

    /// Column rule, repeatable (e.g. --rule email=MASK)
    #[arg(long = "rule", value_name = "COLUMN=OP", value_parser = parse_rule)]
    pub rules: Vec<(String, Operation)>,

    /// Apply OP to every column
    #[arg(long, value_name = "OP")]
    pub all: Option<Operation>,

    /// Leave a column untouched, repeatable
    #[arg(long, value_name = "COLUMN")]
    pub exclude: Vec<String>,

    /// Where to save the sanitized file (file or directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip downloading the sanitized file
    #[arg(long)]
    pub no_download: bool,

    /// Show the before/after diff when the job finishes
    #[arg(long)]
    pub diff: bool,

    /// Print the job id and exit without waiting
    #[arg(long)]
    pub detach: bool,

    /// Export the job summary as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

fn parse_rule(s: &str) -> Result<(String, Operation), String> {
    let (col, op) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=OP, got '{s}'"))?;
    let col = col.trim();
    if col.is_empty() {
        return Err(format!("missing column name in '{s}'"));
    }
    Ok((col.to_string(), op.parse()?))
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    let max_wait = Duration::from(args.max_wait);
    ClientConfig {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        max_wait: (!max_wait.is_zero()).then_some(max_wait),
        request_timeout: Duration::from(args.timeout),
        user_agent: format!("csv-sanitizer/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let client = SanitizerClient::new(&cfg).context("invalid --base-url")?;
    let (tx, out_handle) = spawn_output_writer();
    let out = Output {
        tx,
        json: args.json,
        silent: args.silent,
    };

    let res = run_command(&args.command, &client, &cfg, &out).await;

    drop(out);
    let _ = out_handle.await;
    res
}

async fn run_command(
    command: &Command,
    client: &SanitizerClient,
    cfg: &ClientConfig,
    out: &Output,
) -> Result<()> {
    match command {
        Command::Health => run_health(client, cfg, out).await,
        Command::Preview { file, rows } => run_preview(client, out, file, *rows).await,
        Command::Sanitize(args) => run_sanitize(client, cfg, out, args).await,
        Command::Status { id, watch } => run_status(client, cfg, out, *id, *watch).await,
        Command::JobPreview { id, input, rows } => {
            let table = client
                .job_file_preview(*id, !*input, *rows)
                .await
                .with_context(|| format!("failed to preview job {id}"))?;
            out.render(&view::table_view(&table), text_summary::preview_lines)
        }
        Command::Diff { id, rows } => {
            let diff = client
                .diff(*id, *rows)
                .await
                .with_context(|| format!("failed to load diff for job {id}"))?;
            out.render(&view::diff_view(*id, &diff), text_summary::diff_lines)
        }
        Command::Download { id, output } => {
            let job = client.job_status(*id).await.context("Failed to check status")?;
            let target = output.clone().unwrap_or_else(storage::default_output_dir);
            let name = view::output_file_name(job.output_file.as_deref());
            let path = client
                .download(*id, &target, &name)
                .await
                .with_context(|| format!("failed to download job {id}"))?;
            out.render(&path, |p| vec![format!("Saved to: {}", p.display())])
        }
        Command::Stop { id } => {
            client
                .stop_job(*id)
                .await
                .with_context(|| format!("failed to stop job {id}"))?;
            out.render(id, |id| vec![format!("Stop requested for job {id}")])
        }
        Command::Restart { id, watch } => {
            let job = client
                .restart_job(*id)
                .await
                .with_context(|| format!("failed to restart job {id}"))?;
            out.notice(format!("Restarted job {id} as {}", job.job_execution_id));
            if *watch {
                let job = follow(client, cfg, out, job).await?;
                render_result(client, out, &job)
            } else {
                out.render(&job, |j| vec![view::progress_text(j)])
            }
        }
        Command::History { limit, local } => {
            if *local {
                let saved = storage::load_recent(*limit)?;
                out.render(&saved, |s| text_summary::local_history_lines(s))
            } else {
                let mut records = client.audits().await.context("failed to load job history")?;
                records.truncate(*limit);
                out.render(&records, |r| text_summary::history_lines(r))
            }
        }
        Command::Stats => {
            let stats = client.audit_stats().await.context("failed to load statistics")?;
            out.render(&stats, text_summary::stats_lines)
        }
    }
}

async fn run_health(client: &SanitizerClient, cfg: &ClientConfig, out: &Output) -> Result<()> {
    let status = client.health().await;
    out.render(&status, |s| vec![text_summary::health_line(s)])?;
    if !status.is_online() {
        bail!("service at {} is offline", cfg.base_url);
    }
    Ok(())
}

/// Validate a local CSV path the way a file picker would.
async fn select_csv(session: &mut UploadState, path: &Path) -> Result<SelectedFile> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let file = SelectedFile::new(path.to_path_buf(), meta.len());
    session.select_file(file.clone())?;
    Ok(file)
}

async fn run_preview(client: &SanitizerClient, out: &Output, path: &Path, rows: usize) -> Result<()> {
    let mut session = UploadState::default();
    let file = select_csv(&mut session, path).await?;
    let outcome = preview::load_preview(client, &file, rows).await?;
    if let Some(reason) = outcome.degraded.clone() {
        out.notice(InfoEvent::PreviewDegraded { reason }.to_message());
    }
    out.render(&view::preview_view(&outcome), text_summary::preview_lines)
}

#[derive(Serialize)]
struct SanitizeReport<'a> {
    session: SessionView,
    result: &'a ResultView,
    downloaded: Option<&'a Path>,
    diff: Option<&'a DiffView>,
}

async fn run_sanitize(
    client: &SanitizerClient,
    cfg: &ClientConfig,
    out: &Output,
    args: &SanitizeArgs,
) -> Result<()> {
    let mut session = UploadState::default();
    let file = select_csv(&mut session, &args.file).await?;

    let outcome = preview::load_preview(client, &file, DEFAULT_PREVIEW_ROWS).await?;
    if let Some(reason) = outcome.degraded.clone() {
        out.notice(InfoEvent::PreviewDegraded { reason }.to_message());
    }
    session.set_headers(outcome.headers);

    if let Some(op) = args.all {
        session.apply_default_to_all(op, |_| true);
    }
    for (col, op) in &args.rules {
        if session.is_enabled(col) {
            session.set_operation(col, *op)?;
        } else {
            session.toggle_column(col, true, *op)?;
        }
    }
    for col in &args.exclude {
        let op = session.operation_for(col);
        session.toggle_column(col, false, op)?;
    }
    if !session.is_submittable() {
        bail!(
            "no columns selected; use --rule COLUMN=OP or --all OP (columns: {})",
            session.headers().join(", ")
        );
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = spawn_event_printer(event_rx, out.clone());
    let mut controller = JobController::new(client.clone(), cfg.clone(), event_tx);

    if !out.json {
        for l in text_summary::session_lines(&view::session_view(&session, controller.phase(), None)) {
            out.notice(l);
        }
    }

    let outcome = if args.detach {
        controller
            .submit_detached(&mut session)
            .await
            .map(|job_id| (job_id, None))
    } else {
        match controller.submit(&mut session).await {
            Ok(job_id) => wait_with_ctrl_c(&mut controller, out)
                .await
                .map(|job| (job_id, Some(job))),
            Err(e) => Err(e),
        }
    };
    let phase = controller.phase();
    let last_job = controller.job().cloned();
    drop(controller);
    let _ = printer.await;

    let (job_id, job) = outcome?;
    let Some(job) = job else {
        return out.render(&job_id, |id| vec![format!("Submitted job {id}")]);
    };

    let download_to = if args.no_download {
        None
    } else {
        Some(args.output.clone().unwrap_or_else(storage::default_output_dir))
    };
    let opts = CompletionOptions {
        download_to: download_to.as_deref(),
        diff_rows: args.diff.then_some(DEFAULT_DIFF_ROWS),
        export_json: args.export_json.as_deref(),
        auto_save: args.auto_save,
    };
    let processed =
        process_job_completion(client, &opts, session.rules(), Some(&file.name), &job).await;
    for m in &processed.messages {
        out.notice(m.clone());
    }
    if let Some(p) = processed.auto_saved_path.as_deref() {
        out.notice(format!("Saved: {}", p.display()));
    }

    let report = SanitizeReport {
        session: view::session_view(&session, phase, last_job.as_ref()),
        result: &processed.result,
        downloaded: processed.downloaded.as_deref(),
        diff: processed.diff.as_ref(),
    };
    out.render(&report, |r| {
        let mut lines = text_summary::result_lines(r.result, r.downloaded);
        if let Some(diff) = r.diff {
            lines.push(String::new());
            lines.extend(text_summary::diff_lines(diff));
        }
        lines
    })
}

async fn run_status(
    client: &SanitizerClient,
    cfg: &ClientConfig,
    out: &Output,
    id: JobId,
    watch: bool,
) -> Result<()> {
    let job = client.job_status(id).await.context("Failed to check status")?;
    if watch && !job.status.is_terminal() {
        let job = follow(client, cfg, out, job).await?;
        return render_result(client, out, &job);
    }
    if job.status.is_success() {
        return render_result(client, out, &job);
    }
    out.render(&job, |j| vec![view::progress_text(j)])?;
    if job.status == JobStatus::Failed {
        // Same exit as a job that fails while being watched.
        let description = job.exit_description.clone();
        return Err(JobError::JobFailed {
            job: Box::new(job),
            description,
        }
        .into());
    }
    Ok(())
}

/// Poll an already running job to its end.
async fn follow(
    client: &SanitizerClient,
    cfg: &ClientConfig,
    out: &Output,
    job: JobHandle,
) -> Result<JobHandle> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = spawn_event_printer(event_rx, out.clone());
    let mut controller = JobController::new(client.clone(), cfg.clone(), event_tx);
    controller.attach(job)?;
    let res = wait_with_ctrl_c(&mut controller, out).await;
    drop(controller);
    let _ = printer.await;
    Ok(res?)
}

fn render_result(client: &SanitizerClient, out: &Output, job: &JobHandle) -> Result<()> {
    let url = client.download_url(job.job_execution_id)?;
    let result = view::result_view(job, url.as_str());
    out.render(&result, |r| text_summary::result_lines(r, None))
}

/// Wait for the controller's poll task, cancelling it on Ctrl-C.
async fn wait_with_ctrl_c(
    controller: &mut JobController,
    out: &Output,
) -> Result<JobHandle, JobError> {
    let Some(canceller) = controller.canceller() else {
        return controller.wait().await;
    };
    let notice = out.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            notice.notice(
                InfoEvent::Cancelling {
                    job_id: canceller.job_id(),
                }
                .to_message(),
            );
            canceller.cancel();
        }
    });
    let res = controller.wait().await;
    ctrl_c.abort();
    res
}

/// Print job events to stderr until every sender is gone.
fn spawn_event_printer(
    mut rx: mpsc::UnboundedReceiver<JobEvent>,
    out: Output,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match ev {
                JobEvent::Submitted { job_id } => out.notice(format!("Submitted job {job_id}")),
                JobEvent::Progress { job } => out.notice(view::progress_text(&job)),
                JobEvent::Info(info) => out.notice(info.to_message()),
                // Terminal outcomes are printed by the caller.
                JobEvent::PhaseChanged { .. } | JobEvent::Completed { .. } | JobEvent::Failed { .. } => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_config;
    use std::ffi::OsString;

    fn test_output(json: bool) -> (Output, mpsc::UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Output {
                tx,
                json,
                silent: false,
            },
            rx,
        )
    }

    fn split(mut rx: mpsc::UnboundedReceiver<OutputLine>) -> (Vec<String>, Vec<String>) {
        let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
        while let Ok(line) = rx.try_recv() {
            match line {
                OutputLine::Stdout(l) => stdout.push(l),
                OutputLine::Stderr(l) => stderr.push(l),
            }
        }
        (stdout, stderr)
    }

    #[test]
    fn rule_parsing() {
        assert_eq!(parse_rule("email=mask"), Ok(("email".into(), Operation::Mask)));
        assert_eq!(
            parse_rule(" ssn = HASH"),
            Ok(("ssn".into(), Operation::Hash))
        );
        assert!(parse_rule("email").is_err());
        assert!(parse_rule("=MASK").is_err());
        assert!(parse_rule("email=shred").is_err());
    }

    #[test]
    fn zero_max_wait_means_unbounded() {
        let args = Cli::try_parse_from(["csv-sanitizer", "--max-wait", "0s", "health"]).unwrap();
        let cfg = build_config(&args);
        assert_eq!(cfg.max_wait, None);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));

        let args = Cli::try_parse_from(["csv-sanitizer", "health"]).unwrap();
        assert_eq!(build_config(&args).max_wait, Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn sanitize_arguments_parse() {
        let args = Cli::try_parse_from([
            "csv-sanitizer",
            "sanitize",
            "people.csv",
            "--rule",
            "email=MASK",
            "--rule",
            "ssn=hash",
            "--all",
            "nullify",
            "--exclude",
            "id",
            "--auto-save",
            "false",
            "--json",
        ])
        .unwrap();
        assert!(args.json);
        let Command::Sanitize(s) = args.command else {
            panic!("expected sanitize");
        };
        assert_eq!(
            s.rules,
            vec![
                ("email".to_string(), Operation::Mask),
                ("ssn".to_string(), Operation::Hash)
            ]
        );
        assert_eq!(s.all, Some(Operation::Nullify));
        assert_eq!(s.exclude, vec!["id"]);
        assert!(!s.auto_save);
    }

    #[tokio::test]
    async fn sanitize_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/preview")
            .with_status(200)
            .with_body(r#"{"headers":["id","email","ssn"],"rows":[["1","ada@example.com","123"]],"totalRows":1,"previewRows":1}"#)
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/api/v1/sanitize")
            .match_body(mockito::Matcher::Regex(
                r#"\{"columns":\{"email":"MASK","ssn":"HASH"\}\}"#.into(),
            ))
            .with_status(202)
            .with_body(r#"{"jobExecutionId": 42}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/jobs/42")
            .with_status(200)
            .with_body(r#"{"jobExecutionId": 42, "status": "RUNNING", "rowsProcessed": 0}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/jobs/42")
            .with_status(200)
            .with_body(r#"{"jobExecutionId": 42, "status": "COMPLETED", "rowsProcessed": 1, "outputFile": "/out/people_sanitized.csv"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/jobs/42/download")
            .with_status(200)
            .with_body("id,email,ssn\n1,ad***@example.com,a1b2\n")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("people.csv");
        std::fs::write(&input, "id,email,ssn\n1,ada@example.com,123\n").unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let argv: Vec<OsString> = vec![
            "csv-sanitizer".into(),
            "sanitize".into(),
            input.clone().into(),
            "--rule".into(),
            "email=MASK".into(),
            "--rule".into(),
            "ssn=HASH".into(),
            "--output".into(),
            out_dir.clone().into(),
            "--auto-save".into(),
            "false".into(),
        ];
        let args = Cli::try_parse_from(argv).unwrap();
        let cfg = test_config(&server.url());
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(false);

        run_command(&args.command, &client, &cfg, &out).await.unwrap();
        submit.assert_async().await;

        let (stdout, stderr) = split(rx);
        assert!(stdout.contains(&"Job ID: 42".to_string()), "{stdout:?}");
        assert!(stdout.contains(&"Output File: people_sanitized.csv".to_string()));
        assert!(stderr.contains(&"Submitted job 42".to_string()), "{stderr:?}");
        assert!(stderr.contains(&"Status: RUNNING | Rows: 0".to_string()));
        assert!(std::fs::read_to_string(out_dir.join("people_sanitized.csv"))
            .unwrap()
            .contains("ad***@example.com"));
    }

    #[tokio::test]
    async fn sanitize_without_rules_fails_before_submit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/preview")
            .with_status(503)
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/api/v1/sanitize")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("people.csv");
        std::fs::write(&input, "id,email\n1,a@b.c\n").unwrap();
        let cfg = test_config(&server.url());
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(false);

        let argv: Vec<OsString> = vec!["csv-sanitizer".into(), "sanitize".into(), input.into()];
        let args = Cli::try_parse_from(argv).unwrap();
        let err = run_command(&args.command, &client, &cfg, &out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("columns: id, email"), "{err}");
        submit.assert_async().await;

        let (_, stderr) = split(rx);
        assert!(stderr.iter().any(|l| l.contains("headers parsed locally")));
    }

    #[tokio::test]
    async fn non_csv_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.xlsx");
        std::fs::write(&input, "x").unwrap();
        let cfg = test_config("http://127.0.0.1:9");
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, _rx) = test_output(false);

        let err = run_preview(&client, &out, &input, 10).await.unwrap_err();
        assert!(err.to_string().starts_with("Please upload a CSV file"));
    }

    #[tokio::test]
    async fn health_offline_is_an_error_in_json_too() {
        let cfg = test_config("http://127.0.0.1:9");
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(true);

        assert!(run_health(&client, &cfg, &out).await.is_err());
        let (stdout, _) = split(rx);
        let printed: serde_json::Value = serde_json::from_str(&stdout[0]).unwrap();
        assert_eq!(printed["state"], "offline");
    }

    #[tokio::test]
    async fn job_preview_reads_stored_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/jobs/42/preview/output")
            .match_query(mockito::Matcher::UrlEncoded("rows".into(), "10".into()))
            .with_status(200)
            .with_body(r#"{"headers":["email"],"rows":[["ad***@example.com"]],"totalRows":1,"previewRows":1}"#)
            .create_async()
            .await;
        let cfg = test_config(&server.url());
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(false);

        let args = Cli::try_parse_from(["csv-sanitizer", "job-preview", "42"]).unwrap();
        run_command(&args.command, &client, &cfg, &out).await.unwrap();
        let (stdout, _) = split(rx);
        assert_eq!(
            stdout,
            vec!["email", "-----------------", "ad***@example.com", "Showing 1 of 1 rows"]
        );
    }

    #[tokio::test]
    async fn status_of_failed_job_shows_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/jobs/7")
            .with_status(200)
            .with_body(r#"{"jobExecutionId": 7, "status": "FAILED", "rowsProcessed": 3, "exitDescription": "bad row 7"}"#)
            .create_async()
            .await;
        let cfg = test_config(&server.url());
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(false);

        for watch in [false, true] {
            let err = run_status(&client, &cfg, &out, 7, watch).await.unwrap_err();
            assert_eq!(err.to_string(), "Job failed: bad row 7");
        }
        drop(out);
        let (stdout, _) = split(rx);
        assert_eq!(
            stdout,
            vec!["Status: FAILED | Rows: 3", "Status: FAILED | Rows: 3"]
        );
    }

    #[tokio::test]
    async fn detached_sanitize_submits_without_polling() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/preview")
            .with_status(200)
            .with_body(r#"{"headers":["id","email"],"rows":[["1","a@b.c"]],"totalRows":1,"previewRows":1}"#)
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/api/v1/sanitize")
            .with_status(202)
            .with_body(r#"{"jobExecutionId": 42}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api/v1/jobs/42")
            .with_status(200)
            .with_body(r#"{"jobExecutionId": 42, "status": "RUNNING"}"#)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("people.csv");
        std::fs::write(&input, "id,email\n1,a@b.c\n").unwrap();
        let argv: Vec<OsString> = vec![
            "csv-sanitizer".into(),
            "sanitize".into(),
            input.into(),
            "--rule".into(),
            "email=MASK".into(),
            "--detach".into(),
        ];
        let args = Cli::try_parse_from(argv).unwrap();
        let cfg = test_config(&server.url());
        let client = SanitizerClient::new(&cfg).unwrap();
        let (out, rx) = test_output(false);

        run_command(&args.command, &client, &cfg, &out).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        submit.assert_async().await;
        status.assert_async().await;
        let (stdout, _) = split(rx);
        assert_eq!(stdout.last().map(String::as_str), Some("Submitted job 42"));
    }
}
