//! Tekton PipelineRuns and TaskRuns, pod logs and Argo CD applications,
//! read through the Kubernetes API.

mod objects;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::core::DynamicObject;
use kube::{Api, Client};
use log::{debug, info};

use crate::config::KubernetesConfig;
use crate::error::Result;
use crate::model::{PipelineRun, TaskRun};
use crate::poll::{wait_for, PollPolicy};

use objects::{
    application_ready, application_resource, pipeline_run_resource, task_run_resource,
    to_pipeline_run, to_task_run, EVENT_TYPE_LABEL, PIPELINE_RUN_LABEL, REPOSITORY_LABEL,
};

pub struct TektonClient {
    client: Client,
    namespace: String,
    argocd_namespace: String,
}

impl TektonClient {
    pub fn new(client: Client, config: &KubernetesConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            argocd_namespace: config.argocd_namespace.clone(),
        }
    }

    /// Connects with the ambient kubeconfig or in-cluster service account.
    pub async fn connect(config: &KubernetesConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, config))
    }

    fn pipeline_runs(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &pipeline_run_resource())
    }

    fn task_runs(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &task_run_resource())
    }

    /// Newest PipelineRun Pipelines-as-Code started for `repository` on
    /// `event_type` (e.g. `push`, `pull_request`).
    pub async fn get_pipeline_run_by_repository(
        &self,
        repository: &str,
        event_type: &str,
    ) -> Result<Option<PipelineRun>> {
        let selector = format!("{REPOSITORY_LABEL}={repository},{EVENT_TYPE_LABEL}={event_type}");
        let runs = self
            .pipeline_runs()
            .list(&ListParams::default().labels(&selector))
            .await?;

        debug!(
            "Found {} PipelineRun(s) for {repository} ({event_type}) in {}",
            runs.items.len(),
            self.namespace
        );

        Ok(runs
            .items
            .iter()
            .map(to_pipeline_run)
            .max_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    pub async fn get_task_runs_from_pipeline_run(
        &self,
        pipeline_run: &str,
    ) -> Result<Vec<TaskRun>> {
        let selector = format!("{PIPELINE_RUN_LABEL}={pipeline_run}");
        let runs = self
            .task_runs()
            .list(&ListParams::default().labels(&selector))
            .await?;

        Ok(runs.items.iter().map(to_task_run).collect())
    }

    /// Log of `pod`; `container` picks one when the pod has several steps.
    pub async fn read_pod_log(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
    ) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: container.map(str::to_owned),
            ..LogParams::default()
        };

        Ok(pods.logs(pod, &params).await?)
    }

    /// Waits for the newest matching PipelineRun to exist and finish.
    pub async fn wait_for_pipeline_run(
        &self,
        repository: &str,
        event_type: &str,
        policy: &PollPolicy,
    ) -> Option<PipelineRun> {
        let description = format!("PipelineRun for {repository} ({event_type})");
        wait_for(policy, &description, move || async move {
            let run = self
                .get_pipeline_run_by_repository(repository, event_type)
                .await?;
            Ok::<_, crate::error::E2eError>(run.filter(|run| run.status.is_terminal()))
        })
        .await
    }

    /// Waits until the Argo CD application is `Healthy` and `Synced`.
    pub async fn wait_for_argo_application_healthy(
        &self,
        application: &str,
        policy: &PollPolicy,
    ) -> bool {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &self.argocd_namespace,
            &application_resource(),
        );
        let api = &api;

        let ready = wait_for(
            policy,
            &format!("Argo CD application {application}"),
            move || async move {
                let app = api.get(application).await?;
                Ok::<_, kube::Error>(application_ready(&app).then_some(()))
            },
        )
        .await
        .is_some();

        if ready {
            info!("Argo CD application {application} is healthy and synced");
        }
        ready
    }
}
