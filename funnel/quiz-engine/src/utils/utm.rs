use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

use crate::storage::ClientStorage;

pub const UTM_STORAGE_KEY: &str = "utm_params";

/// Marketing attribution captured from the landing URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtmParams {
    #[serde(rename = "utmCampaign", skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(rename = "utmAdGroup", skip_serializing_if = "Option::is_none")]
    pub ad_group: Option<String>,
    #[serde(rename = "utmAd", skip_serializing_if = "Option::is_none")]
    pub ad: Option<String>,
    #[serde(rename = "utmPlacement", skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,
    #[serde(rename = "utmKeyword", skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(rename = "utmSite", skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(rename = "utmSource", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "utmMedium", skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(rename = "utmContent", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "utmTerm", skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl UtmParams {
    /// Read UTM tags from a landing URL's query string.
    ///
    /// Ad-platform specific keys fall back to their closest standard key
    /// (`utm_placement` to `utm_source`, `utm_keyword` to `utm_term`, ...).
    pub fn from_landing_url(landing_url: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(landing_url)?;
        let query: HashMap<String, String> = url
            .query_pairs()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key.to_ascii_lowercase(), value.into_owned()))
            .collect();

        let first = |keys: &[&str]| keys.iter().find_map(|key| query.get(*key).cloned());

        Ok(Self {
            campaign: first(&["utm_campaign"]),
            ad_group: first(&["utm_adgroup", "utm_ad_group"]),
            ad: first(&["utm_ad", "utm_creative"]),
            placement: first(&["utm_placement", "utm_source"]),
            keyword: first(&["utm_keyword", "utm_term"]),
            site: first(&["utm_site", "utm_network"]),
            source: first(&["utm_source"]),
            medium: first(&["utm_medium"]),
            content: first(&["utm_content"]),
            term: first(&["utm_term"]),
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// First-touch attribution: a stored set wins over the current URL.
pub fn capture_utm(storage: &dyn ClientStorage, landing_url: Option<&str>) -> UtmParams {
    match storage.get_item(UTM_STORAGE_KEY) {
        Ok(Some(stored)) => match serde_json::from_str::<UtmParams>(&stored) {
            Ok(params) => return params,
            Err(e) => warn!("Ignoring unreadable stored UTM params: {}", e),
        },
        Ok(None) => {}
        Err(e) => warn!("Failed to read stored UTM params: {}", e),
    }

    let Some(landing_url) = landing_url else {
        return UtmParams::default();
    };

    let params = match UtmParams::from_landing_url(landing_url) {
        Ok(params) => params,
        Err(e) => {
            warn!("Landing URL '{}' is not a valid URL: {}", landing_url, e);
            return UtmParams::default();
        }
    };

    if !params.is_empty() {
        match serde_json::to_string(&params) {
            Ok(raw) => {
                if let Err(e) = storage.set_item(UTM_STORAGE_KEY, &raw) {
                    warn!("Failed to persist UTM params: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize UTM params: {}", e),
        }
        debug!("Captured UTM params: {:?}", params);
    }

    params
}
