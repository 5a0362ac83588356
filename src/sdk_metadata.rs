use std::collections::HashMap;

/// Identity of the SDK, sent along with configuration requests and attached to assignment events.
///
/// Passed explicitly through [`ClientConfig`](crate::ClientConfig) so that wrappers built on top
/// of this crate can report their own name and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkMetadata {
    /// SDK name. Usually, language name.
    pub name: &'static str,
    /// Version of SDK.
    pub version: &'static str,
}

impl Default for SdkMetadata {
    fn default() -> Self {
        SdkMetadata {
            name: "rust",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl SdkMetadata {
    pub(crate) fn as_meta_data(&self) -> HashMap<String, String> {
        HashMap::from([
            ("sdkLanguage".to_owned(), self.name.to_owned()),
            ("sdkVersion".to_owned(), self.version.to_owned()),
        ])
    }
}
