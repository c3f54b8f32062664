//! Laconic definitions of prometheus metrics.
//!
//! ```ignore
//! labels! {
//!     DeliveryLabels { path }
//! }
//!
//! counters! {
//!     /// Number of posts delivered to recipients
//!     broadcast_deliveries_total;
//! }
//!
//! broadcast_deliveries_total(DeliveryLabels { path: "copy" }).increment(1);
//! ```
//!
//! Metric names are prefixed with the name of the crate. Histogram buckets are
//! chosen by the suffix of the metric name in [`init_metrics`].

use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use metrics_exporter_prometheus::Matcher;
use serde::Deserialize;

/// Histogram buckets to measure the distribution of request durations in seconds
const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Broadcast batches take much longer than single requests
const BATCH_DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
];

const KB: f64 = 1024.;
const MB: f64 = 1024. * KB;

const DEFAULT_BLOB_SIZE_BUCKETS: &[f64] = &[
    KB * 16.,
    KB * 64.,
    KB * 256.,
    MB * 1.,
    MB * 2.,
    MB * 5.,
    MB * 10.,
    MB * 20.,
    MB * 50.,
];

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    2000
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("");

    let buckets = [
        ("broadcast_batch_duration_seconds", BATCH_DURATION_BUCKETS),
        ("_duration_seconds", DEFAULT_DURATION_BUCKETS),
        ("_bytes", DEFAULT_BLOB_SIZE_BUCKETS),
    ];

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port));

    for (suffix, buckets) in buckets {
        builder = builder
            .set_buckets_for_metric(Matcher::Suffix(suffix.to_owned()), buckets)
            .unwrap_or_else(|err| {
                panic!("BUG: histogram buckets for `{suffix}` are empty: {err:?}")
            });
    }

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .expect("BUG: failed to initialize the metrics listener");
}

/// Defines a struct with fields equal to label names. Every field value
/// must implement [`Into`] [`metrics::SharedString`].
macro_rules! labels {
    ($( $vis:vis $Labels:ident { $( $label:ident ),* $(,)? } )*) => {
        $(
            #[derive(Clone, Copy, Debug)]
            #[allow(non_camel_case_types)]
            $vis struct $Labels<$($label = String,)*> {
                $( $vis $label: $label, )*
            }

            #[allow(non_camel_case_types)]
            impl<$($label,)*> ::metrics::IntoLabels for $Labels<$($label,)*>
            where
                $($label: Into<::metrics::SharedString>,)*
            {
                fn into_labels(self) -> Vec<::metrics::Label> {
                    vec![$(::metrics::Label::new(stringify!($label), self.$label)),*]
                }
            }
        )*
    };
}

macro_rules! define_metrics {
    (
        $describe:ident,
        $register:ident,
        $metric_ty:ident,
        $( $(#[doc = $help:literal])* $vis:vis $metric:ident; )*
    ) => {
        $(
            $( #[doc = $help] )*
            $vis fn $metric(labels: impl ::metrics::IntoLabels) -> ::metrics::$metric_ty {
                const METRIC: &str = concat!(env!("CARGO_CRATE_NAME"), "_", stringify!($metric));

                static DESCRIBE: std::sync::Once = std::sync::Once::new();
                DESCRIBE.call_once(|| {
                    let help = [$($help.trim()),*].join("\n");
                    ::metrics::$describe!(METRIC, help);
                });

                ::metrics::$register!(METRIC, labels)
            }
        )*
    };
}

macro_rules! counters {
    ($($tt:tt)*) => {
        $crate::observability::metrics::define_metrics!(
            describe_counter, register_counter, Counter, $($tt)*
        );
    };
}

macro_rules! histograms {
    ($($tt:tt)*) => {
        $crate::observability::metrics::define_metrics!(
            describe_histogram, register_histogram, Histogram, $($tt)*
        );
    };
}

pub(crate) use {counters, define_metrics, histograms, labels};
