// Recognition + encyclopedia intake
// Loosely-shaped payloads from the recognition and encyclopedia services are
// validated here and turned into PlantRecord. Nothing past this module sees
// the raw response shapes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PlantScopeError, Result};
use crate::identity::derive_key;
use crate::model::{EncyclopediaSummary, PlantIdentity, PlantMedia, PlantRecord};

// Encyclopedia images we can display
static IMAGE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif)$").expect("valid image url pattern"));

/// Ranked candidates returned by the recognition service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResponse {
    #[serde(default)]
    pub results: Vec<RecognitionCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionCandidate {
    #[serde(default)]
    pub score: Option<f64>,
    pub species: SpeciesInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesInfo {
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub common_names: Vec<String>,
    #[serde(default)]
    pub family: Option<Taxon>,
    #[serde(default)]
    pub genus: Option<Taxon>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxon {
    #[serde(default)]
    pub scientific_name: String,
}

/// Encyclopedia lookup result. Optional enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncyclopediaEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub extract: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl RecognitionResponse {
    /// The only candidate the collection consumes.
    pub fn top_candidate(&self) -> Result<&RecognitionCandidate> {
        self.results
            .first()
            .ok_or_else(|| PlantScopeError::NotFound("recognition returned no candidates".to_string()))
    }
}

/// Keep only URLs that point at displayable images.
pub fn filter_image_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .map(|u| u.as_ref().trim().to_string())
        .filter(|u| !u.is_empty() && IMAGE_URL_RE.is_match(u))
        .collect()
}

fn clean_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn taxon_name(taxon: &Option<Taxon>) -> String {
    taxon
        .as_ref()
        .map(|t| t.scientific_name.trim().to_string())
        .unwrap_or_default()
}

/// Confidence outside [0,1] (or NaN) is dropped rather than clamped.
fn valid_score(score: Option<f64>) -> Option<f64> {
    match score {
        Some(s) if (0.0..=1.0).contains(&s) => Some(s),
        Some(s) => {
            log::warn!("Discarding out-of-range confidence score {}", s);
            None
        }
        None => None,
    }
}

impl EncyclopediaEntry {
    /// None when the entry carries nothing worth keeping.
    pub fn into_summary(self) -> Option<EncyclopediaSummary> {
        let title = self.title.trim().to_string();
        let extract = self.extract.map(|e| e.trim().to_string()).unwrap_or_default();
        let images = filter_image_urls(&self.images);

        if title.is_empty() && extract.is_empty() && images.is_empty() {
            return None;
        }

        Some(EncyclopediaSummary { title, extract, images })
    }
}

/// Build a validated record from the top recognition candidate.
pub fn build_record(
    candidate: &RecognitionCandidate,
    encyclopedia: Option<EncyclopediaEntry>,
    local_uri: Option<String>,
) -> Result<PlantRecord> {
    let scientific_name = candidate
        .species
        .scientific_name
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();

    // Reject before anything else is built
    derive_key(&scientific_name)?;

    Ok(PlantRecord {
        identity: PlantIdentity {
            scientific_name,
            common_names: clean_names(&candidate.species.common_names),
            family: taxon_name(&candidate.species.family),
            genus: taxon_name(&candidate.species.genus),
        },
        confidence_score: valid_score(candidate.score),
        media: PlantMedia {
            local_uri: local_uri.filter(|u| !u.trim().is_empty()),
            remote_url: None,
        },
        encyclopedia: encyclopedia.and_then(EncyclopediaEntry::into_summary),
        remote_doc_id: None,
    })
}

/// Parse a raw recognition response and build a record from its top candidate.
pub fn record_from_response(
    response_json: &str,
    encyclopedia: Option<EncyclopediaEntry>,
    local_uri: Option<String>,
) -> Result<PlantRecord> {
    let response: RecognitionResponse = serde_json::from_str(response_json)?;
    build_record(response.top_candidate()?, encyclopedia, local_uri)
}
