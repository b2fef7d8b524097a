// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by Waypoint
pub mod annotations {
    /// Prefix for per-item parameters (`item.waypoint.dev/<param>`)
    pub const ITEM_PREFIX: &str = "item.waypoint.dev/";
    /// Prefix for per-group parameters (`group.waypoint.dev/<param>`)
    pub const GROUP_PREFIX: &str = "group.waypoint.dev/";
    /// Stamped on every discovered resource with its source cluster
    pub const CLUSTER: &str = "waypoint.dev/cluster";

    /// Annotation prefixes inherited from namespaces
    pub const INHERITED_PREFIXES: [&str; 2] = [ITEM_PREFIX, GROUP_PREFIX];
}

/// Labels applied to managed objects
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const DASHBOARD: &str = "waypoint.dev/dashboard";
}

/// The operator name used as field manager and managed-by value
pub const OPERATOR_NAME: &str = "waypoint";

/// Finalizer guarding cleanup of managed objects
pub const FINALIZER: &str = "waypoint.dev/finalizer";

/// Name of the connection to the cluster the operator runs in
pub const LOCAL_CLUSTER: &str = "local";

/// Managed ConfigMap layout
pub mod managed {
    /// Suffix appended to the dashboard name
    pub const CONFIG_MAP_SUFFIX: &str = "-waypoint";
    /// Key holding the rendered document
    pub const CONFIG_KEY: &str = "config.yml";
}

/// Remote cluster credentials
pub mod credentials {
    /// Secret key read when a remote cluster does not name one
    pub const DEFAULT_KUBECONFIG_KEY: &str = "kubeconfig";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

pub mod defaults {
    pub const RESYNC_INTERVAL_SECS: u64 = 300;
    pub const WORKERS: usize = 4;
    pub const CLUSTER_DOMAIN: &str = "cluster.local";
    /// Requeue delay after a failed reconcile
    pub const ERROR_REQUEUE_SECS: u64 = 60;
}
