//! Mapping from arbitrary cluster ids to business interpretations
//!
//! Cluster numbering is not stable across retrainings. After every retrain
//! the table has to be re-derived from the cluster summaries printed by the
//! trainer and supplied through configuration.

use serde::{Deserialize, Serialize};

/// Interpretation attached to one cluster id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub id: usize,
    pub label: String,
    /// Display color / severity tag
    pub color: String,
    pub action: String,
    pub risk_level: String,
}

impl ClusterProfile {
    fn new(id: usize, label: &str, color: &str, action: &str, risk_level: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            color: color.to_string(),
            action: action.to_string(),
            risk_level: risk_level.to_string(),
        }
    }

    fn unclassified(id: usize) -> Self {
        Self::new(
            id,
            "Unclassified",
            "gray",
            "Action: Manual Review. No interpretation is registered for this cluster.",
            "Unknown",
        )
    }
}

/// Customer ages the model is allowed to score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeGuard {
    pub min: f64,
    pub max: f64,
}

impl Default for AgeGuard {
    fn default() -> Self {
        Self {
            min: 16.0,
            max: 95.0,
        }
    }
}

impl AgeGuard {
    pub fn triggers(&self, age: f64) -> bool {
        age < self.min || age > self.max
    }
}

/// Outcome of scoring one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Clustered {
        cluster: usize,
        profile: ClusterProfile,
    },
    ManualReview {
        reason: String,
    },
}

impl Verdict {
    pub fn cluster(&self) -> Option<usize> {
        match self {
            Verdict::Clustered { cluster, .. } => Some(*cluster),
            Verdict::ManualReview { .. } => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Verdict::Clustered { profile, .. } => &profile.label,
            Verdict::ManualReview { .. } => "Manual Review",
        }
    }

    pub fn risk_level(&self) -> &str {
        match self {
            Verdict::Clustered { profile, .. } => &profile.risk_level,
            Verdict::ManualReview { .. } => "Manual Review",
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Verdict::Clustered { profile, .. } => &profile.action,
            Verdict::ManualReview { reason } => reason,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Verdict::Clustered { cluster, profile } => format!(
                "{} (Cluster {}), risk level {}",
                profile.label, cluster, profile.risk_level
            ),
            Verdict::ManualReview { reason } => reason.clone(),
        }
    }
}

/// Cluster interpretation table plus the age override rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTable {
    #[serde(default = "default_profiles")]
    pub clusters: Vec<ClusterProfile>,
    #[serde(default)]
    pub age_guard: AgeGuard,
}

impl Default for RiskTable {
    fn default() -> Self {
        Self {
            clusters: default_profiles(),
            age_guard: AgeGuard::default(),
        }
    }
}

fn default_profiles() -> Vec<ClusterProfile> {
    vec![
        ClusterProfile::new(
            0,
            "Standard Buyer",
            "blue",
            "Action: Auto-Approve. This profile fits typical shopping patterns. No further action needed.",
            "Low",
        ),
        ClusterProfile::new(
            1,
            "High-Value Anomaly",
            "red",
            "Action: IMMEDIATE HOLD. Large amount outlier. Contact customer via phone to verify identity before shipping.",
            "Extremely High",
        ),
        ClusterProfile::new(
            2,
            "Night-time Suspicious",
            "orange",
            "Action: Manual Review. Transaction occurred at an unusual hour. Cross-reference IP address with shipping address.",
            "High",
        ),
        ClusterProfile::new(
            3,
            "Verified VIP",
            "green",
            "Action: Priority Handling. Trusted loyalty member. Approve and apply complimentary express shipping.",
            "Safe",
        ),
    ]
}

impl RiskTable {
    /// Profile for a cluster id; unmapped ids fall back to "Unclassified"
    pub fn profile(&self, cluster: usize) -> ClusterProfile {
        self.clusters
            .iter()
            .find(|p| p.id == cluster)
            .cloned()
            .unwrap_or_else(|| ClusterProfile::unclassified(cluster))
    }

    /// Manual-review verdict when the age guard fires, `None` otherwise
    pub fn screen_age(&self, age: Option<f64>) -> Option<Verdict> {
        let age = age?;
        self.age_guard.triggers(age).then(|| Verdict::ManualReview {
            reason: format!(
                "ALERT: Physically impossible age ({age}) detected. Manual fraud investigation required."
            ),
        })
    }

    pub fn interpret(&self, cluster: usize) -> Verdict {
        Verdict::Clustered {
            cluster,
            profile: self.profile(cluster),
        }
    }
}
