use crate::{
    core::Tracker,
    discover,
    k8s::{self, templates, Api, DynamicObject, ResourceExt},
    probe,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "policy-readiness",
    about = "Tracks whether policy resources have been loaded"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "policy_readiness=info,warn",
        env = "POLICY_READINESS_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// How often readiness is checked while resources are outstanding.
    #[clap(long, default_value = "1000")]
    probe_period_ms: u64,

    /// How long to wait before retrying a failed list.
    #[clap(long, default_value = "5000")]
    list_backoff_ms: u64,

    /// Gates readiness on constraint templates only.
    #[clap(long)]
    constraints_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            probe_period_ms,
            list_backoff_ms,
            constraints_disabled,
        } = self;
        let probe_period = Duration::from_millis(probe_period_ms);
        let list_backoff = Duration::from_millis(list_backoff_ms);

        let mut prom = <Registry>::default();
        let metrics = k8s::TrackerMetrics::register(prom.sub_registry_with_prefix("readiness"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let tracker = Tracker::shared([templates::gvk()]);
        // Templates are watched before they are listed so that no observations are missed.
        let templates_api =
            Api::<DynamicObject>::all_with(runtime.client(), &templates::api_resource());
        tokio::spawn(
            templates::observe_template_events(
                k8s::watch_all(templates_api.clone()),
                tracker.clone(),
            )
            .instrument(info_span!("constrainttemplates")),
        );

        let listed = discover::templates(
            &templates_api,
            &tracker.for_kind(&templates::gvk()),
            list_backoff,
        )
        .await;

        if constraints_disabled {
            tracing::info!("Constraint tracking is disabled");
        } else {
            for template in listed {
                if template.metadata.deletion_timestamp.is_some() {
                    continue;
                }
                let gvk = match templates::constraint_gvk(&template) {
                    Ok(gvk) => gvk,
                    Err(error) => {
                        tracing::warn!(%error, "Skipping constraints for invalid template");
                        continue;
                    }
                };
                tracker.for_kind(&gvk);
                if tracker.get(&gvk).is_none() {
                    tracing::debug!(kind = %gvk.kind, "Template was deleted");
                    continue;
                }
                let span = info_span!("constraints", kind = %gvk.kind, template = %template.name_any());
                tokio::spawn(
                    discover::constraints(runtime.client(), tracker.clone(), gvk, list_backoff)
                        .instrument(span),
                );
            }
        }

        // Constraint kinds are registered before the probe starts so that the tracker can't be
        // satisfied by templates alone. The admin server reports ready once the handle is dropped.
        let mut initialized = Some(runtime.initialized_handle());
        tokio::spawn(
            probe::run(tracker.clone(), metrics, probe_period, move |ready| {
                if ready {
                    drop(initialized.take());
                }
            })
            .instrument(info_span!("probe")),
        );

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
