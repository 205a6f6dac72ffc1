// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, RealtimeExitCode, Result, display,
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use junit_report::{ReadOptions, Report, StdioRetention};
use realtime_junit::{
    archiver::{ArchiveRequest, ExternalArchiver, JunitArchiver},
    config::{JobConfig, RealtimeConfig, RealtimeJunitOptions, RefreshMode},
    errors::DisplayErrorChain,
    handle::{HandleConfig, TrackingHandle},
    helpers::plural,
    host::{
        Build, BuildOutcome, WorkspaceLocation,
        local::{LocalBuild, LocalJob, LocalWorkspaces},
    },
    lifecycle::BlockLifecycleManager,
    parser::JunitParser,
};
use std::{io::Write, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// The glob used when neither the command line nor the config names one.
const DEFAULT_GLOB: &str = "**/TEST-*.xml";

/// Watch the JUnit reports of a running build.
///
/// junit-realtime reparses the partial JUnit XML reports written into a workspace while tests
/// are still running, and estimates progress against the final result of an earlier run.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "junit-realtime",
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct RealtimeJunitApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl RealtimeJunitApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Show(opts) => opts.exec(output, output_writer),
            Command::Watch(opts) => opts.exec(output, output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse the reports in a workspace once and print the result
    Show(ShowOpts),

    /// Poll the reports in a workspace until the run ends, then archive the final result
    Watch(WatchOpts),
}

#[derive(Debug, Args)]
struct WorkspaceOpts {
    /// Workspace to read reports from [default: current directory]
    #[arg(long, short = 'w', value_name = "DIR")]
    workspace: Option<Utf8PathBuf>,

    /// Comma or space separated globs matching report files, relative to the workspace
    #[arg(long, short = 'g', value_name = "GLOBS")]
    glob: Option<String>,

    /// Name of the job whose settings are read from the config
    #[arg(long, value_name = "NAME", default_value = "local")]
    job: String,

    /// JUnit report of an earlier run, used to estimate progress
    #[arg(long, value_name = "PATH")]
    baseline: Option<Utf8PathBuf>,

    /// Config file [default: workspace/.config/realtime-junit.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// How much test output to keep: none, failed or all
    #[arg(long, value_name = "RETENTION")]
    stdio_retention: Option<StdioRetention>,
}

impl WorkspaceOpts {
    fn workspace_root(&self) -> Result<Utf8PathBuf> {
        let root = match &self.workspace {
            Some(workspace) => workspace.clone(),
            None => {
                let dir = std::env::current_dir()
                    .map_err(|err| ExpectedError::CurrentDirFailed { err })?;
                Utf8PathBuf::try_from(dir).map_err(|err| {
                    ExpectedError::CurrentDirInvalidUtf8 {
                        path: err.into_path_buf(),
                    }
                })?
            }
        };

        if !root.is_dir() {
            return Err(ExpectedError::WorkspaceNotFound { workspace: root });
        }
        Ok(root)
    }

    /// Sets up an in-process build of the job, with the baseline as its previous build.
    fn session(&self, refresh_mode: Option<RefreshMode>) -> Result<LocalSession> {
        let root = self.workspace_root()?;
        let mut config = RealtimeConfig::from_sources(&root, self.config.as_deref())?;
        if let Some(mode) = refresh_mode {
            config.set_refresh_mode(mode);
        }

        let mut options = config
            .job(&self.job)
            .junit
            .unwrap_or_else(|| RealtimeJunitOptions::new(DEFAULT_GLOB));
        if let Some(glob) = &self.glob {
            options.set_test_results(glob.as_str());
        }
        if let Some(retention) = self.stdio_retention {
            options.set_stdio_retention(retention);
        }
        debug!(
            "reading reports matching `{}` in `{root}`",
            options.test_results()
        );

        let job = LocalJob::new(self.job.clone(), JobConfig::realtime(options.clone()));
        let baseline = match &self.baseline {
            Some(path) => Some(read_baseline(path)?),
            None => None,
        };
        // The job only tracks its latest build weakly, so the baseline build must stay alive
        // until the build it precedes has started.
        let _previous = baseline.as_ref().map(|report| {
            let previous = job.start_build();
            previous.record_test_result(report.clone());
            previous.finish(BuildOutcome::Success);
            previous
        });

        let build = job.start_build();
        if let Some(report) = &baseline {
            build.set_estimated_duration(report.duration());
        }
        let workspace = WorkspaceLocation::built_in(root);
        build.set_workspace(workspace.clone());

        Ok(LocalSession {
            config,
            options,
            workspace,
            build,
        })
    }
}

fn read_baseline(path: &Utf8Path) -> Result<Report> {
    let xml = std::fs::read_to_string(path).map_err(|err| ExpectedError::BaselineReadError {
        path: path.to_owned(),
        err,
    })?;
    Report::from_xml(&xml, &ReadOptions::new(StdioRetention::None)).map_err(|err| {
        ExpectedError::BaselineParseError {
            path: path.to_owned(),
            err,
        }
    })
}

#[derive(Debug)]
struct LocalSession {
    config: RealtimeConfig,
    options: RealtimeJunitOptions,
    workspace: WorkspaceLocation,
    build: Arc<LocalBuild>,
}

impl LocalSession {
    fn manager(&self, archiver: Arc<JunitArchiver>) -> BlockLifecycleManager {
        BlockLifecycleManager::new(
            &self.config,
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
            archiver,
        )
    }

    fn handle_config(&self) -> HandleConfig {
        HandleConfig {
            build: self.build.id().clone(),
            block: None,
            glob: self.options.test_results().to_owned(),
            workspace: self.workspace.clone(),
            stdio_retention: self.options.stdio_retention(),
            parse_interval: self.options.parse_interval(),
        }
    }

    fn attach(&self, manager: &BlockLifecycleManager) -> Result<Arc<TrackingHandle>> {
        Ok(manager.attach(self.build.clone(), self.handle_config())?)
    }
}

#[derive(Debug, Args)]
struct ShowOpts {
    #[clap(flatten)]
    workspace: WorkspaceOpts,
}

impl ShowOpts {
    fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let session = self.workspace.session(Some(RefreshMode::Always))?;
        let archiver = Arc::new(JunitArchiver::new(
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
        ));
        let manager = session.manager(archiver);
        let handle = session.attach(&manager)?;

        let result = handle.result();
        let progress = handle.progress();
        manager.on_build_finalized(session.build.as_ref());
        session.build.finish(BuildOutcome::Success);

        let Some(report) = result else {
            warn!(
                "no test reports matching `{}` found in `{}`",
                session.options.test_results(),
                session.workspace.path,
            );
            return Ok(RealtimeExitCode::NO_RESULTS);
        };

        let styles = output.stdout_styles();
        let mut writer = output_writer.stdout_writer();
        display::write_report(&mut writer, &report, progress.as_deref(), &styles)
            .and_then(|()| writer.flush())
            .map_err(ExpectedError::write_output_error)?;

        if report.fail_count() > 0 {
            Ok(RealtimeExitCode::TESTS_FAILED)
        } else {
            Ok(RealtimeExitCode::OK)
        }
    }
}

#[derive(Debug, Args)]
struct WatchOpts {
    #[clap(flatten)]
    workspace: WorkspaceOpts,

    /// How often to reparse reports
    #[arg(long, value_name = "DURATION", default_value = "5s", value_parser = humantime::parse_duration)]
    poll: Duration,

    /// Stop watching once this file exists
    #[arg(long, value_name = "PATH")]
    until: Option<Utf8PathBuf>,

    /// Stop watching after this many polls
    #[arg(long, value_name = "N")]
    max_polls: Option<usize>,

    /// Write the final result as JUnit XML into this directory
    #[arg(long, value_name = "DIR")]
    output: Option<Utf8PathBuf>,
}

impl WatchOpts {
    fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let session = self.workspace.session(None)?;
        let mut archiver = JunitArchiver::new(
            Arc::new(JunitParser::new()),
            Arc::new(LocalWorkspaces::new()),
        );
        if let Some(dir) = &self.output {
            archiver = archiver.with_output_dir(dir.clone());
        }
        let archiver = Arc::new(archiver);
        let manager = session.manager(archiver.clone());
        let handle = session.attach(&manager)?;

        let styles = output.stdout_styles();
        let mut writer = output_writer.stdout_writer();

        let mut last_counts = None;
        let mut poll = 0;
        loop {
            poll += 1;
            let result = handle.result();
            let counts = result
                .as_ref()
                .map(|report| (report.total_count(), report.fail_count(), report.skip_count()));
            if let Some(report) = &result
                && (output.verbose || counts != last_counts)
            {
                display::write_status_line(
                    &mut writer,
                    poll,
                    report,
                    handle.progress().as_deref(),
                    &styles,
                )
                .and_then(|()| writer.flush())
                .map_err(ExpectedError::write_output_error)?;
            }
            last_counts = counts;

            if self.until.as_ref().is_some_and(|until| until.exists()) {
                debug!("stop file found after {poll} polls");
                break;
            }
            if self.max_polls.is_some_and(|max_polls| poll >= max_polls) {
                break;
            }
            std::thread::sleep(self.poll);
        }

        let provisional = handle.result();
        manager.on_build_finalized(session.build.as_ref());

        let result = archiver.archive(&ArchiveRequest {
            build: session.build.as_ref(),
            node: None,
            workspace: &session.workspace,
            options: &session.options,
            pipeline: None,
            allow_empty: session.options.allow_empty_results(),
        });

        let summary = match result {
            Ok(summary) => summary,
            Err(err) => {
                session.build.finish(BuildOutcome::Failure);
                let Some(provisional) = provisional else {
                    return Err(ExpectedError::ArchiveError {
                        provisional_count: None,
                        err,
                    });
                };

                let count = provisional.total_count();
                info!(
                    "recording {count} provisional test {}",
                    plural::results_str(count)
                );
                if let Err(record_err) = archiver.record_provisional(
                    session.build.as_ref(),
                    None,
                    Arc::unwrap_or_clone(provisional),
                ) {
                    warn!(
                        "failed to record provisional test results: {}",
                        DisplayErrorChain::new(&record_err)
                    );
                }
                return Err(ExpectedError::ArchiveError {
                    provisional_count: Some(count),
                    err,
                });
            }
        };

        if let Some(report) = session.build.test_result() {
            let progress = handle.progress();
            display::write_report(&mut writer, &report, progress.as_deref(), &styles)
                .map_err(ExpectedError::write_output_error)?;
        }
        if let Some(health) = &summary.health {
            display::write_health(&mut writer, health, &styles)
                .map_err(ExpectedError::write_output_error)?;
        }
        writer.flush().map_err(ExpectedError::write_output_error)?;

        if summary.failed > 0 {
            session.build.mark_unstable();
        }
        session.build.finish(BuildOutcome::Success);

        if summary.failed > 0 {
            Ok(RealtimeExitCode::TESTS_FAILED)
        } else {
            Ok(RealtimeExitCode::OK)
        }
    }
}
