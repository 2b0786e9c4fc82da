use crate::error::Error;

use kube::ResourceExt;
use opentelemetry::trace::TraceId;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{
    counter::Counter, exemplar::HistogramWithExemplars, family::Family, gauge::Gauge,
};
use prometheus_client::registry::{Registry, Unit};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::time::Instant;

/// Registers both metric families into a registry owned by the caller
/// (main also registers the kube-client HTTP metrics into the same
/// registry, so `/metrics` exposes everything from one pull endpoint).
#[derive(Clone)]
pub struct Metrics {
    pub reconcile: ReconcileMetrics,
    pub quota: QuotaMetrics,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        Self {
            reconcile: ReconcileMetrics::default().register(registry),
            quota: QuotaMetrics::default().register(registry),
        }
    }
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct TraceLabel {
    pub id: String,
}
impl TryFrom<&TraceId> for TraceLabel {
    type Error = Error;

    fn try_from(id: &TraceId) -> Result<TraceLabel, Self::Error> {
        if std::matches!(id, &TraceId::INVALID) {
            Err(Error::InvalidTraceId)
        } else {
            let trace_id = id.to_string();
            Ok(Self { id: trace_id })
        }
    }
}

/// Shared by every reconciler (C5-C9); `controller` distinguishes which
/// one produced a given sample since they all write into one registry.
#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Family<ControllerLabel, Counter>,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: HistogramWithExemplars<TraceLabel>,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Family::<ControllerLabel, Counter>::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            duration: HistogramWithExemplars::new([0.1, 0.5, 1., 5., 10.].into_iter()),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ControllerLabel {
    pub controller: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    pub instance: String,
    pub error: String,
}

impl ReconcileMetrics {
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "reconcile_duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register(
            "reconcile_failures",
            "reconciliation errors",
            self.failures.clone(),
        );
        r.register("reconcile_runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn set_failure<K: ResourceExt>(&self, controller: &str, obj: &Arc<K>, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                controller: controller.to_owned(),
                instance: obj.name_any(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self, controller: &str, trace_id: &TraceId) -> ReconcileMeasurer {
        self.runs
            .get_or_create(&ControllerLabel {
                controller: controller.to_owned(),
            })
            .inc();
        ReconcileMeasurer {
            start: Instant::now(),
            labels: trace_id.try_into().ok(),
            metric: self.duration.clone(),
        }
    }
}

/// Relies on Drop to calculate duration and register the observation in the histogram.
pub struct ReconcileMeasurer {
    start: Instant,
    labels: Option<TraceLabel>,
    metric: HistogramWithExemplars<TraceLabel>,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = self.labels.take();
        self.metric.observe(duration, labels);
    }
}

/// Per-org resource counts (spec.md §4.2, §6) reported as gauges rather
/// than counters: they reflect current state, not cumulative events, and
/// get overwritten wholesale every time a reconciler recounts an org's
/// children.
#[derive(Clone, Default)]
pub struct QuotaMetrics {
    pub clusters_current: Family<OrgLabel, Gauge>,
    pub projects_current: Family<OrgLabel, Gauge>,
    pub applications_current: Family<OrgLabel, Gauge>,
    pub quota_usage: Family<QuotaUsageLabel, Gauge<f64, AtomicU64>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OrgLabel {
    pub org: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct QuotaUsageLabel {
    pub org: String,
    pub resource_type: String,
}

impl QuotaMetrics {
    pub fn register(self, r: &mut Registry) -> Self {
        r.register(
            "cluster_current_total",
            "clusters currently belonging to an organization",
            self.clusters_current.clone(),
        );
        r.register(
            "project_current_total",
            "projects currently belonging to an organization",
            self.projects_current.clone(),
        );
        r.register(
            "application_current_total",
            "applications currently belonging to an organization",
            self.applications_current.clone(),
        );
        r.register(
            "org_quota_usage",
            "fraction of quota currently consumed per resource type",
            self.quota_usage.clone(),
        );
        self
    }

    pub fn set_cluster_count(&self, org: &str, count: i64) {
        self.clusters_current
            .get_or_create(&OrgLabel { org: org.to_owned() })
            .set(count);
    }

    pub fn set_project_count(&self, org: &str, count: i64) {
        self.projects_current
            .get_or_create(&OrgLabel { org: org.to_owned() })
            .set(count);
    }

    pub fn set_application_count(&self, org: &str, count: i64) {
        self.applications_current
            .get_or_create(&OrgLabel { org: org.to_owned() })
            .set(count);
    }

    pub fn set_quota_usage(&self, org: &str, resource_type: &str, count: i64, quota: i32) {
        let usage = if quota > 0 { count as f64 / quota as f64 } else { 0.0 };
        self.quota_usage
            .get_or_create(&QuotaUsageLabel {
                org: org.to_owned(),
                resource_type: resource_type.to_owned(),
            })
            .set(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_usage_is_a_fraction_of_quota_consumed() {
        let metrics = QuotaMetrics::default();
        metrics.set_quota_usage("acme", "clusters", 3, 10);
        let value = metrics
            .quota_usage
            .get_or_create(&QuotaUsageLabel {
                org: "acme".to_owned(),
                resource_type: "clusters".to_owned(),
            })
            .get();
        assert!((value - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_quota_reports_zero_usage_instead_of_dividing_by_zero() {
        let metrics = QuotaMetrics::default();
        metrics.set_quota_usage("acme", "clusters", 3, 0);
        let value = metrics
            .quota_usage
            .get_or_create(&QuotaUsageLabel {
                org: "acme".to_owned(),
                resource_type: "clusters".to_owned(),
            })
            .get();
        assert_eq!(value, 0.0);
    }
}
