/// One classic configuration API: the directory name projects use for it,
/// its REST path, and how its list responses are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicApi {
    pub id: &'static str,
    pub path: &'static str,
    /// Property of the get-all response holding the object list.
    pub list_property: &'static str,
    /// Single-instance APIs (global tenant settings) have exactly one object
    /// and skip the match-by-name step on upsert.
    pub single_instance: bool,
}

const STANDARD_LIST_PROPERTY: &str = "values";

const fn api(id: &'static str, path: &'static str) -> ClassicApi {
    ClassicApi {
        id,
        path,
        list_property: STANDARD_LIST_PROPERTY,
        single_instance: false,
    }
}

const fn listed_api(id: &'static str, path: &'static str, list_property: &'static str) -> ClassicApi {
    ClassicApi {
        id,
        path,
        list_property,
        single_instance: false,
    }
}

const fn single_instance_api(id: &'static str, path: &'static str) -> ClassicApi {
    ClassicApi {
        id,
        path,
        list_property: STANDARD_LIST_PROPERTY,
        single_instance: true,
    }
}

/// The known classic configuration APIs. Project directories named after an
/// entry become classic-api config buckets.
pub const CLASSIC_APIS: &[ClassicApi] = &[
    api("alerting-profile", "/api/config/v1/alertingProfiles"),
    api("management-zone", "/api/config/v1/managementZones"),
    api("auto-tag", "/api/config/v1/autoTags"),
    listed_api("dashboard", "/api/config/v1/dashboards", "dashboards"),
    api("notification", "/api/config/v1/notifications"),
    listed_api("extension", "/api/config/v1/extensions", "extensions"),
    api("custom-service-java", "/api/config/v1/service/customServices/java"),
    api("custom-service-dotnet", "/api/config/v1/service/customServices/dotNet"),
    api("custom-service-go", "/api/config/v1/service/customServices/go"),
    api("anomaly-detection-metrics", "/api/config/v1/anomalyDetection/metricEvents"),
    api("synthetic-location", "/api/v1/synthetic/locations"),
    api("synthetic-monitor", "/api/v1/synthetic/monitors"),
    api("application-web", "/api/config/v1/applications/web"),
    api("application-mobile", "/api/config/v1/applications/mobile"),
    api("app-detection-rule", "/api/config/v1/applicationDetectionRules"),
    api("aws-credentials", "/api/config/v1/aws/credentials"),
    api("azure-credentials", "/api/config/v1/azure/credentials"),
    api("kubernetes-credentials", "/api/config/v1/kubernetes/credentials"),
    api("request-attributes", "/api/config/v1/service/requestAttributes"),
    api("calculated-metrics-service", "/api/config/v1/calculatedMetrics/service"),
    api("calculated-metrics-log", "/api/config/v1/calculatedMetrics/log"),
    api("calculated-metrics-application-web", "/api/config/v1/calculatedMetrics/rum"),
    api("conditional-naming-processgroup", "/api/config/v1/conditionalNaming/processGroup"),
    api("conditional-naming-host", "/api/config/v1/conditionalNaming/host"),
    api("conditional-naming-service", "/api/config/v1/conditionalNaming/service"),
    api("maintenance-window", "/api/config/v1/maintenanceWindows"),
    api("request-naming-service", "/api/config/v1/service/requestNaming"),
    listed_api("slo", "/api/v2/slo", "slo"),
    listed_api("credential-vault", "/api/config/v1/credentials", "credentials"),
    api("failure-detection-parametersets", "/api/config/v1/service/failureDetection/parameterSelection/parameterSets"),
    api("failure-detection-rules", "/api/config/v1/service/failureDetection/parameterSelection/rules"),
    api("service-detection-full-web-request", "/api/config/v1/service/detectionRules/FULL_WEB_REQUEST"),
    api("service-detection-full-web-service", "/api/config/v1/service/detectionRules/FULL_WEB_SERVICE"),
    single_instance_api("frequent-issue-detection", "/api/config/v1/frequentIssueDetection"),
    single_instance_api("data-privacy", "/api/config/v1/dataPrivacy"),
    single_instance_api("hosts-auto-update", "/api/config/v1/hosts/autoupdate"),
    single_instance_api("anomaly-detection-hosts", "/api/config/v1/anomalyDetection/hosts"),
    single_instance_api("anomaly-detection-services", "/api/config/v1/anomalyDetection/services"),
    single_instance_api("anomaly-detection-vmware", "/api/config/v1/anomalyDetection/vmware"),
    single_instance_api("service-resource-naming", "/api/config/v1/service/resourceNaming"),
    single_instance_api("allowed-beacon-origins", "/api/config/v1/allowedBeaconOriginsForCors"),
    single_instance_api("geo-ip-detection-headers", "/api/config/v1/geographicRegions/ipDetectionHeaders"),
];

/// Look up a classic API by its id (also the project directory name).
#[must_use]
pub fn classic_api(id: &str) -> Option<&'static ClassicApi> {
    CLASSIC_APIS.iter().find(|api| api.id == id)
}

/// Whether a directory name denotes a classic API bucket.
#[must_use]
pub fn is_classic_api(id: &str) -> bool {
    classic_api(id).is_some()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::collections::BTreeSet;

    use super::{CLASSIC_APIS, classic_api, is_classic_api};

    #[test]
    fn api_ids_are_unique() {
        let ids: BTreeSet<&str> = CLASSIC_APIS.iter().map(|api| api.id).collect();
        assert_eq!(ids.len(), CLASSIC_APIS.len());
    }

    #[test]
    fn dashboard_overrides_the_list_property() {
        let dashboard = classic_api("dashboard").expect("dashboard api");
        assert_eq!(dashboard.path, "/api/config/v1/dashboards");
        assert_eq!(dashboard.list_property, "dashboards");
        assert!(!dashboard.single_instance);
    }

    #[test]
    fn standard_apis_list_under_values() {
        let zones = classic_api("management-zone").expect("management-zone api");
        assert_eq!(zones.list_property, "values");
    }

    #[test]
    fn single_instance_apis_are_marked() {
        let privacy = classic_api("data-privacy").expect("data-privacy api");
        assert!(privacy.single_instance);
    }

    #[test]
    fn unknown_directories_are_not_apis() {
        assert!(is_classic_api("auto-tag"));
        assert!(!is_classic_api("sub-project"));
    }
}
