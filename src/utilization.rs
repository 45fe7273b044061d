use tracing::warn;

/// The Trusted Advisor check "Low Utilization Amazon EC2 Instances"
pub const LOW_UTILIZATION_CHECK_ID: &str = "Qch7DwouX1";

/// A `support describe-trusted-advisor-check-result` response
#[derive(Debug, serde::Deserialize)]
pub struct CheckResultResponse {
    pub result: CheckResult,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(default)]
    pub check_id: Option<String>,
    #[serde(default)]
    pub flagged_resources: Vec<FlaggedResource>,
}

/// A resource flagged by a check, its metadata columns depend on the check
#[derive(Debug, serde::Deserialize)]
pub struct FlaggedResource {
    #[serde(default)]
    pub metadata: Vec<Option<String>>,
}

impl FlaggedResource {
    fn column(&self, index: usize) -> String {
        self.metadata
            .get(index)
            .cloned()
            .flatten()
            .unwrap_or_default()
    }
}

/// An EC2 instance that was under 10% CPU utilization on most recent days
#[derive(Clone, Debug, serde::Serialize, PartialEq, Eq)]
pub struct UnderutilizedInstance {
    pub region: String,
    pub instance_id: String,
    pub instance_name: String,
    pub instance_type: String,
    pub estimated_monthly_savings: String,
    /// The 14 day average CPU utilization
    pub average_cpu: String,
    /// The 14 day average network I/O
    pub average_network_io: String,
}

impl From<&FlaggedResource> for UnderutilizedInstance {
    fn from(resource: &FlaggedResource) -> Self {
        Self {
            region: resource.column(0),
            instance_id: resource.column(1),
            instance_name: resource.column(2),
            instance_type: resource.column(3),
            estimated_monthly_savings: resource.column(4),
            average_cpu: resource.column(19),
            average_network_io: resource.column(20),
        }
    }
}

/// Extracts the underutilized instances from a low utilization check result
pub fn underutilized_instances(result: &CheckResult) -> Vec<UnderutilizedInstance> {
    match result.check_id.as_deref() {
        Some(id) if id != LOW_UTILIZATION_CHECK_ID => {
            warn!(check_id = id, "the check result is not a low utilization check");
        }
        _ => {}
    }

    result
        .flagged_resources
        .iter()
        .map(UnderutilizedInstance::from)
        .collect()
}
