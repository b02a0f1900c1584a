use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::auth::Token;
use crate::config::Config;
use crate::manifest::{promote, promote_in_repository};
use crate::model::{MergeStatus, PipelineStatus, PortalTaskStatus};
use crate::output::{print_summary, WaitSpinner};
use crate::providers::developer_hub::TaskOptions;
use crate::providers::{
    DeveloperHubClient, GitHubProvider, GitLabProvider, JenkinsClient, PipelineSource,
    ScmProvider, TektonClient,
};
use crate::resolver::PipelineResolver;
use crate::verdict::{TaskSummary, Verdict};
use crate::verify::{inspect, report, ExecutedTask, ExpectedTaskSet};

#[derive(Parser)]
#[command(name = "tssc-e2e")]
#[command(
    author,
    version,
    about = "End-to-end checks for software templates",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON verdict to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// GitLab repositories and GitLab CI pipelines
    Gitlab(GitLabArgs),
    /// GitHub repositories and GitHub Actions workflow runs
    Github(GitHubArgs),
    /// Jenkins builds of one job
    Jenkins(JenkinsArgs),
    /// Tekton PipelineRuns and Argo CD applications on the cluster
    Tekton(TektonArgs),
    /// Developer Hub scaffolder
    Portal(PortalArgs),
}

#[derive(Args)]
struct GitLabArgs {
    #[arg(short, long, env = "GITLAB_TOKEN")]
    token: Option<String>,

    #[arg(short, long)]
    url: Option<String>,

    #[arg(short = 'P', long)]
    project: Option<String>,

    #[command(subcommand)]
    command: GitLabCommand,
}

#[derive(Subcommand)]
enum GitLabCommand {
    /// Wait for the pipeline of a commit to appear and finish
    WaitPipeline {
        #[arg(long = "ref")]
        ref_: String,
        #[arg(long)]
        sha: String,
    },
    /// Show the most recent pipeline
    Latest {
        #[arg(long = "ref")]
        ref_: Option<String>,
    },
    /// Cancel the oldest pipeline still running on a ref
    CancelOldest {
        #[arg(long = "ref")]
        ref_: String,
    },
    /// Copy the image of one environment manifest into another in the GitOps repository
    Promote {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Promote this image instead of the one found in the source manifest
        #[arg(long)]
        image: Option<String>,
    },
    /// Wait until a merge request can be merged
    WaitMergeable {
        #[arg(long)]
        iid: u64,
    },
    /// Check that the jobs of a pipeline ran the required commands
    JobLogs {
        #[arg(long)]
        pipeline: u64,
        #[arg(long, value_delimiter = ',', required = true)]
        tasks: Vec<String>,
    },
    #[command(flatten)]
    Repo(RepoCommand),
}

#[derive(Args)]
struct GitHubArgs {
    #[arg(short, long, env = "GITHUB_TOKEN")]
    token: Option<String>,

    #[arg(short, long)]
    url: Option<String>,

    /// Repository in 'owner/repo' form
    #[arg(short = 'R', long)]
    repo: Option<String>,

    #[command(subcommand)]
    command: GitHubCommand,
}

#[derive(Subcommand)]
enum GitHubCommand {
    /// Wait for the workflow run of a commit to appear and finish
    WaitRun {
        #[arg(long = "ref")]
        ref_: String,
        #[arg(long)]
        sha: String,
    },
    #[command(flatten)]
    Repo(RepoCommand),
}

/// Repository actions available on every SCM provider.
#[derive(Subcommand)]
enum RepoCommand {
    /// Create a branch from another branch
    CreateBranch {
        #[arg(long)]
        branch: String,
        #[arg(long, default_value = "main")]
        from: String,
    },
    /// Commit a local file as a new file of the repository
    Commit {
        #[arg(long)]
        branch: String,
        /// Path of the new file in the repository
        #[arg(long)]
        path: String,
        /// Local file with the content to commit
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        message: String,
    },
    /// Open a merge request (a pull request on GitHub)
    OpenMr {
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "main")]
        target: String,
        #[arg(long)]
        title: String,
    },
    /// Merge a merge request (a pull request on GitHub)
    Merge {
        #[arg(long)]
        id: u64,
    },
    /// Create or overwrite a CI variable of the repository
    SetVariable {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
}

impl RepoCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateBranch { .. } => "create-branch",
            Self::Commit { .. } => "commit",
            Self::OpenMr { .. } => "open-mr",
            Self::Merge { .. } => "merge",
            Self::SetVariable { .. } => "set-variable",
        }
    }
}

#[derive(Args)]
struct JenkinsArgs {
    #[arg(short, long, env = "JENKINS_TOKEN")]
    token: Option<String>,

    #[arg(short, long)]
    url: Option<String>,

    #[arg(long, env = "JENKINS_USERNAME")]
    username: Option<String>,

    /// Job path, folders separated by '/'
    #[arg(short, long)]
    job: Option<String>,

    #[command(subcommand)]
    command: JenkinsCommand,
}

#[derive(Subcommand)]
enum JenkinsCommand {
    /// Wait for a build to finish (the latest one when no number is given)
    WaitBuild {
        #[arg(long)]
        build: Option<u64>,
    },
}

#[derive(Args)]
struct TektonArgs {
    /// Namespace of the PipelineRuns
    #[arg(short, long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: TektonCommand,
}

#[derive(Subcommand)]
enum TektonCommand {
    /// Wait for the PipelineRun of a repository and verify its TaskRuns
    Verify {
        #[arg(long)]
        repository: String,
        #[arg(long, default_value = "push")]
        event: String,
        #[arg(long, value_delimiter = ',', required = true)]
        tasks: Vec<String>,
    },
    /// Wait for an Argo CD application to become healthy and synced
    WaitArgo {
        #[arg(long)]
        app: String,
    },
}

#[derive(Args)]
struct PortalArgs {
    #[arg(short, long, env = "DEVELOPER_HUB_TOKEN")]
    token: Option<String>,

    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: PortalCommand,
}

#[derive(Subcommand)]
enum PortalCommand {
    /// Start a scaffolder task from a template
    CreateTask {
        #[arg(long)]
        template_ref: String,
        /// JSON or YAML file with the template parameters
        #[arg(long)]
        values: PathBuf,
        /// Wait for the task to finish
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    value.with_context(|| format!("missing {what}: pass it as a flag or set it in the config file"))
}

fn token(flag: &Option<String>, configured: &Option<String>) -> Option<Token> {
    flag.as_ref().or(configured.as_ref()).cloned().map(Token::from)
}

fn expected_tasks(tasks: &[String], config: &Config) -> ExpectedTaskSet {
    ExpectedTaskSet::new(tasks.iter().cloned())
        .with_overrides(&config.verification.required_commands)
}

/// Verdict for a set of executed tasks against what the scenario expects.
fn task_verdict<T: ExecutedTask>(
    mut verdict: Verdict,
    runs: &[T],
    expected: &ExpectedTaskSet,
) -> Verdict {
    verdict.tasks = runs.iter().map(TaskSummary::of).collect();
    verdict.mismatches = inspect(runs, expected);

    if report(&verdict.mismatches, expected) {
        verdict.pass(format!("all {} expected tasks ran as required", expected.len()))
    } else {
        let message = format!("{} mismatch(es) found", verdict.mismatches.len());
        verdict.fail(message)
    }
}

async fn wait_for_pipeline<S: PipelineSource + ?Sized>(
    verdict: Verdict,
    resolver: &PipelineResolver<'_, S>,
    ref_: &str,
    sha: &str,
) -> Verdict {
    let spinner = WaitSpinner::start(&format!("Waiting for pipeline of {ref_}@{sha}"));
    let pipeline = resolver.wait_for_pipeline_result(ref_, sha).await;
    let verdict = verdict.with_pipeline_result(pipeline, "pipeline");
    spinner.finish(verdict.passed, &verdict.message);
    verdict
}

/// Last `lines` lines of a log.
fn log_tail(log: &str, lines: usize) -> &str {
    let start = log
        .trim_end()
        .rmatch_indices('\n')
        .nth(lines.saturating_sub(1))
        .map_or(0, |(index, _)| index + 1);
    &log[start..]
}

fn read_values(path: &Path) -> Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template values: {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse template values: {}", path.display()))
}

async fn run_repo_command<P: ScmProvider + ?Sized>(
    provider: &P,
    command: &RepoCommand,
    verdict: Verdict,
) -> Result<Verdict> {
    let verdict = match command {
        RepoCommand::CreateBranch { branch, from } => {
            provider.create_branch(branch, from).await?;
            verdict.pass(format!("created branch {branch} from {from}"))
        }
        RepoCommand::Commit {
            branch,
            path,
            file,
            message,
        } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let sha = provider.create_commit(branch, path, &content, message).await?;
            Verdict {
                commit_sha: Some(sha.clone()),
                ..verdict
            }
            .pass(format!("committed {path} to {branch} in {sha}"))
        }
        RepoCommand::OpenMr {
            source,
            target,
            title,
        } => {
            let merge_request = provider.create_merge_request(source, target, title).await?;
            let message = format!(
                "opened merge request {} ({source} -> {target})",
                merge_request.id
            );
            Verdict {
                merge_status: Some(merge_request.merge_status),
                merge_request: Some(merge_request),
                ..verdict
            }
            .pass(message)
        }
        RepoCommand::Merge { id } => {
            provider.merge_merge_request(*id).await?;
            verdict.pass(format!("merged merge request {id}"))
        }
        RepoCommand::SetVariable { key, value } => {
            provider.set_repo_variable(key, value).await?;
            verdict.pass(format!("set variable {key}"))
        }
    };
    Ok(verdict)
}

impl Cli {
    async fn execute_gitlab(&self, args: &GitLabArgs, config: &Config) -> Result<Verdict> {
        let base_url = args.url.as_deref().unwrap_or(&config.gitlab.base_url);
        let project = required(
            args.project.clone().or(config.gitlab.project_path.clone()),
            "GitLab project (--project)",
        )?;
        let token = token(&args.token, &config.gitlab.token);
        let provider = GitLabProvider::new(base_url, project.clone(), token.clone())?;
        let resolver = PipelineResolver::new(
            &provider,
            config.polling.creation_policy(),
            config.polling.completion_policy(),
        );

        let verdict = match &args.command {
            GitLabCommand::WaitPipeline { ref_, sha } => {
                let verdict = Verdict::new("gitlab", "wait-pipeline", &project);
                wait_for_pipeline(verdict, &resolver, ref_, sha).await
            }
            GitLabCommand::Latest { ref_ } => {
                let verdict = Verdict::new("gitlab", "latest", &project);
                match resolver.latest(ref_.as_deref()).await? {
                    Some(pipeline) => {
                        let message =
                            format!("latest pipeline is {} ({})", pipeline.id, pipeline.status);
                        Verdict {
                            pipeline: Some(pipeline),
                            ..verdict
                        }
                        .pass(message)
                    }
                    None => verdict.fail("no pipeline found"),
                }
            }
            GitLabCommand::CancelOldest { ref_ } => {
                let verdict = Verdict::new("gitlab", "cancel-oldest", &project);
                match resolver.cancel_oldest(ref_).await? {
                    Some(pipeline) => {
                        let message = format!("canceled pipeline {}", pipeline.id);
                        Verdict {
                            pipeline: Some(pipeline),
                            ..verdict
                        }
                        .pass(message)
                    }
                    None => verdict.pass(format!("no active pipeline on {ref_}")),
                }
            }
            GitLabCommand::Promote {
                branch,
                source,
                target,
                image,
            } => {
                let gitops_project = config
                    .gitlab
                    .gitops_project_path
                    .clone()
                    .unwrap_or(project);
                let gitops = GitLabProvider::new(base_url, gitops_project.clone(), token)?;
                let message = format!("Promote image from {source} to {target}");

                let sha = match image {
                    Some(image) => {
                        let current = gitops.get_file(branch, target).await?;
                        let patched = promote("", &current, Some(image.as_str()))?;
                        gitops.edit_file(branch, target, &patched, &message).await?
                    }
                    None => {
                        promote_in_repository(&gitops, branch, source, target, &message).await?
                    }
                };

                Verdict {
                    commit_sha: Some(sha.clone()),
                    ..Verdict::new("gitlab", "promote", &gitops_project)
                }
                .pass(format!("promoted {target} in commit {sha}"))
            }
            GitLabCommand::WaitMergeable { iid } => {
                let verdict = Verdict::new("gitlab", "wait-mergeable", &project);
                let spinner = WaitSpinner::start(&format!("Waiting for merge request !{iid}"));
                let status = provider
                    .wait_for_mergeable(*iid, &config.polling.completion_policy())
                    .await;

                let verdict = match status {
                    Some(MergeStatus::Mergeable) => Verdict {
                        merge_status: status,
                        ..verdict
                    }
                    .pass(format!("merge request !{iid} can be merged")),
                    Some(other) => Verdict {
                        merge_status: Some(other),
                        ..verdict
                    }
                    .fail(format!("merge request !{iid} has conflicts")),
                    None => verdict.fail(format!("timed out waiting for merge request !{iid}")),
                };
                spinner.finish(verdict.passed, &verdict.message);
                verdict
            }
            GitLabCommand::JobLogs { pipeline, tasks } => {
                let jobs = provider.list_jobs_with_logs(*pipeline).await?;
                let expected = expected_tasks(tasks, config);
                let verdict = Verdict {
                    pipeline: Some(provider.get_pipeline(*pipeline).await?),
                    ..Verdict::new("gitlab", "job-logs", &project)
                };
                task_verdict(verdict, &jobs, &expected)
            }
            GitLabCommand::Repo(command) => {
                let verdict = Verdict::new("gitlab", command.name(), &project);
                run_repo_command(&provider, command, verdict).await?
            }
        };

        Ok(verdict)
    }

    async fn execute_github(&self, args: &GitHubArgs, config: &Config) -> Result<Verdict> {
        let base_url = args.url.as_deref().unwrap_or(&config.github.base_url);
        let repo = required(
            args.repo.clone().or(config.github.repo_path.clone()),
            "GitHub repository (--repo)",
        )?;
        let token = token(&args.token, &config.github.token);
        let provider = GitHubProvider::new(base_url, &repo, token)?;
        let resolver = PipelineResolver::new(
            &provider,
            config.polling.creation_policy(),
            config.polling.completion_policy(),
        );

        match &args.command {
            GitHubCommand::WaitRun { ref_, sha } => {
                let verdict = Verdict::new("github", "wait-run", &repo);
                Ok(wait_for_pipeline(verdict, &resolver, ref_, sha).await)
            }
            GitHubCommand::Repo(command) => {
                let verdict = Verdict::new("github", command.name(), &repo);
                run_repo_command(&provider, command, verdict).await
            }
        }
    }

    async fn execute_jenkins(&self, args: &JenkinsArgs, config: &Config) -> Result<Verdict> {
        let url = required(
            args.url.clone().or(config.jenkins.url.clone()),
            "Jenkins URL (--url)",
        )?;
        let job = required(
            args.job.clone().or(config.jenkins.job.clone()),
            "Jenkins job (--job)",
        )?;
        let client = JenkinsClient::new(
            &url,
            &job,
            args.username.clone().or(config.jenkins.username.clone()),
            token(&args.token, &config.jenkins.token),
        )?;
        let resolver = PipelineResolver::new(
            &client,
            config.polling.creation_policy(),
            config.polling.completion_policy(),
        );

        match &args.command {
            JenkinsCommand::WaitBuild { build } => {
                let verdict = Verdict::new("jenkins", "wait-build", &job);
                let number = match build {
                    Some(number) => *number,
                    None => match resolver.latest(None).await? {
                        Some(latest) => latest.id,
                        None => return Ok(verdict.fail("job has no builds")),
                    },
                };

                let spinner = WaitSpinner::start(&format!("Waiting for build #{number}"));
                let build = resolver.wait_for_completion(number).await;
                let verdict = verdict.with_pipeline_result(build, "build");
                spinner.finish(verdict.passed, &verdict.message);
                Ok(verdict)
            }
        }
    }

    async fn execute_tekton(&self, args: &TektonArgs, config: &Config) -> Result<Verdict> {
        let mut kubernetes = config.kubernetes.clone();
        if let Some(namespace) = &args.namespace {
            kubernetes.namespace.clone_from(namespace);
        }
        let client = TektonClient::connect(&kubernetes).await?;
        let policy = config.polling.completion_policy();

        let verdict = match &args.command {
            TektonCommand::Verify {
                repository,
                event,
                tasks,
            } => {
                let verdict = Verdict::new("tekton", "verify", repository);
                let spinner =
                    WaitSpinner::start(&format!("Waiting for PipelineRun of {repository}"));
                let run = client.wait_for_pipeline_run(repository, event, &policy).await;
                spinner.finish(run.is_some(), "PipelineRun lookup");

                let Some(run) = run else {
                    return Ok(verdict.fail(format!(
                        "timed out waiting for a finished {event} PipelineRun"
                    )));
                };

                let task_runs = client.get_task_runs_from_pipeline_run(&run.name).await?;
                for failed in task_runs.iter().filter(|t| t.status == PipelineStatus::Failed) {
                    let Some(pod) = &failed.pod_name else { continue };
                    // Tekton names step containers `step-<name>`
                    let container = failed.steps.last().map(|step| format!("step-{}", step.name));
                    match client
                        .read_pod_log(pod, &run.namespace, container.as_deref())
                        .await
                    {
                        Ok(log) => warn!(
                            "TaskRun {} failed, pod log:\n{}",
                            failed.name,
                            log_tail(&log, 40)
                        ),
                        Err(e) => warn!("TaskRun {} failed, pod log unavailable: {e}", failed.name),
                    }
                }
                let expected = expected_tasks(tasks, config);
                let succeeded = run.status == PipelineStatus::Success;
                let status = run.status;
                let verdict = task_verdict(
                    Verdict {
                        pipeline_run: Some(run),
                        ..verdict
                    },
                    &task_runs,
                    &expected,
                );

                if verdict.passed && !succeeded {
                    let message = format!("PipelineRun finished as {status}");
                    verdict.fail(message)
                } else {
                    verdict
                }
            }
            TektonCommand::WaitArgo { app } => {
                let verdict = Verdict::new("tekton", "wait-argo", app);
                let spinner = WaitSpinner::start(&format!("Waiting for Argo CD application {app}"));
                let healthy = client.wait_for_argo_application_healthy(app, &policy).await;
                spinner.finish(healthy, app);

                if healthy {
                    verdict.pass(format!("{app} is healthy and synced"))
                } else {
                    verdict.fail(format!("{app} did not become healthy and synced"))
                }
            }
        };

        Ok(verdict)
    }

    async fn execute_portal(&self, args: &PortalArgs, config: &Config) -> Result<Verdict> {
        let url = required(
            args.url.clone().or(config.developer_hub.url.clone()),
            "Developer Hub URL (--url)",
        )?;
        let token = token(&args.token, &config.developer_hub.token);
        let client = DeveloperHubClient::new(&url, token)?;

        match &args.command {
            PortalCommand::CreateTask {
                template_ref,
                values,
                wait,
            } => {
                let options = TaskOptions {
                    template_ref: template_ref.clone(),
                    values: read_values(values)?,
                };
                let verdict = Verdict::new("portal", "create-task", template_ref);
                let id = client.create_task(&options).await?;

                if !*wait {
                    let task = client.get_task_status(&id).await?;
                    return Ok(Verdict {
                        portal_task: Some(task),
                        ..verdict
                    }
                    .pass(format!("started task {id}")));
                }

                let spinner = WaitSpinner::start(&format!("Waiting for scaffolder task {id}"));
                let task = client
                    .wait_for_task(&id, &config.polling.completion_policy())
                    .await;

                let verdict = match task {
                    Some(task) if task.status == PortalTaskStatus::Completed => {
                        Verdict {
                            portal_task: Some(task),
                            ..verdict
                        }
                        .pass(format!("task {id} completed"))
                    }
                    Some(task) => {
                        let message = format!("task {id} ended as {:?}", task.status);
                        Verdict {
                            portal_task: Some(task),
                            ..verdict
                        }
                        .fail(message)
                    }
                    None => verdict.fail(format!("timed out waiting for task {id}")),
                };
                spinner.finish(verdict.passed, &verdict.message);
                Ok(verdict)
            }
        }
    }

    fn emit(&self, verdict: &Verdict) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(verdict)?
        } else {
            serde_json::to_string(verdict)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Verdict written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        print_summary(verdict);
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        let verdict = match &self.command {
            Commands::Gitlab(args) => self.execute_gitlab(args, &config).await?,
            Commands::Github(args) => self.execute_github(args, &config).await?,
            Commands::Jenkins(args) => self.execute_jenkins(args, &config).await?,
            Commands::Tekton(args) => self.execute_tekton(args, &config).await?,
            Commands::Portal(args) => self.execute_portal(args, &config).await?,
        };

        self.emit(&verdict)?;

        if !verdict.passed {
            bail!(
                "{} {} failed: {}",
                verdict.provider,
                verdict.check,
                verdict.message
            );
        }
        Ok(())
    }
}
