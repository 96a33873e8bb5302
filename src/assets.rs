// assets.rs - Asset Naming Module
// Turns free-text names from /addgif into the filename used on the asset host
// and builds the public URLs those files are served from.
//
// Used by: workflow.rs (every step works on the same CanonicalAssetName), sftp.rs

use std::fmt;

const GIF_SUFFIX: &str = ".gif";

/// Canonical filename for a GIF asset.
/// Always lowercase, never contains whitespace, always ends with `.gif`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalAssetName(String);

impl CanonicalAssetName {
    /// Normalize raw user input: trim, lowercase, whitespace -> `_`, ensure `.gif`.
    /// Any input is accepted; an empty name becomes `.gif`.
    pub fn normalize(raw: &str) -> Self {
        let mut name: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();

        if !name.ends_with(GIF_SUFFIX) {
            name.push_str(GIF_SUFFIX);
        }

        CanonicalAssetName(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalAssetName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public URL an asset is (or would be) served from: `{base}/gifs/{name}`
pub fn public_asset_url(public_base: &str, name: &CanonicalAssetName) -> String {
    format!("{}/gifs/{}", public_base.trim_end_matches('/'), name)
}
