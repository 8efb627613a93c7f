use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pattern used when a script declares neither `@match` nor `@include`.
pub const UNIVERSAL_PATTERN: &str = "*://*/*";

/// Name given to scripts whose header does not declare one.
pub const DEFAULT_SCRIPT_NAME: &str = "Untitled Script";

/// Version given to scripts whose header does not declare one.
pub const DEFAULT_SCRIPT_VERSION: &str = "1.0";

/// A stored userscript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    /// Empty until the store assigns one on first upsert.
    pub id: String,
    pub content: String,
    pub metadata: ScriptMetadata,
    pub enabled: bool,
    pub added_at: i64,
}

impl ScriptRecord {
    /// Creates an unsaved, enabled record. The store assigns `id` and `added_at`.
    pub fn new(content: impl Into<String>, metadata: ScriptMetadata) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            metadata,
            enabled: true,
            added_at: 0,
        }
    }
}

/// When a script runs relative to the document lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunAt {
    DocumentStart,
    #[default]
    DocumentEnd,
    DocumentIdle,
}

impl RunAt {
    /// Accepts both `document-start` and `document_start` spellings.
    /// `document-body` is treated as `document_end`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().replace('-', "_").as_str() {
            "document_start" => Some(RunAt::DocumentStart),
            "document_end" | "document_body" => Some(RunAt::DocumentEnd),
            "document_idle" => Some(RunAt::DocumentIdle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunAt::DocumentStart => "document_start",
            RunAt::DocumentEnd => "document_end",
            RunAt::DocumentIdle => "document_idle",
        }
    }
}

/// Which execution context a script prefers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InjectInto {
    Page,
    Content,
    #[default]
    Auto,
}

impl InjectInto {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "page" => Some(InjectInto::Page),
            "content" => Some(InjectInto::Content),
            "auto" => Some(InjectInto::Auto),
            _ => None,
        }
    }
}

/// An `@require` dependency, fetched lazily before injection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequireEntry {
    pub url: String,
    pub loaded: bool,
    pub text_content: Option<String>,
}

impl RequireEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), loaded: false, text_content: None }
    }
}

/// An `@resource` dependency, addressable by name from the script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub name: String,
    pub url: String,
    pub loaded: bool,
    pub res_text: Option<String>,
    pub res_url: Option<String>,
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            loaded: false,
            res_text: None,
            res_url: None,
        }
    }
}

/// Locale-specific overrides from `@name:xx` style directives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LocaleOverride {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Normalized directive set derived from a script header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptMetadata {
    pub name: String,
    pub version: String,
    pub namespace: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub homepage: Option<String>,
    pub icon: Option<String>,
    pub r#match: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub exclude_match: Vec<String>,
    pub require: Vec<RequireEntry>,
    pub resource: Vec<ResourceEntry>,
    pub grant: Vec<String>,
    pub connect: Vec<String>,
    pub run_at: RunAt,
    pub inject_into: InjectInto,
    pub noframes: bool,
    pub unwrap: bool,
    pub locales: BTreeMap<String, LocaleOverride>,
    /// Directives with no dedicated field, last value wins.
    pub meta: BTreeMap<String, String>,
}

impl Default for ScriptMetadata {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCRIPT_NAME.to_string(),
            version: DEFAULT_SCRIPT_VERSION.to_string(),
            namespace: None,
            description: None,
            author: None,
            homepage: None,
            icon: None,
            r#match: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_match: Vec::new(),
            require: Vec::new(),
            resource: Vec::new(),
            grant: Vec::new(),
            connect: Vec::new(),
            run_at: RunAt::default(),
            inject_into: InjectInto::default(),
            noframes: false,
            unwrap: false,
            locales: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }
}

impl ScriptMetadata {
    /// Metadata used when a header cannot be parsed at all.
    pub fn fallback() -> Self {
        let mut metadata = Self::default();
        metadata.r#match.push(UNIVERSAL_PATTERN.to_string());
        metadata
    }

    /// Returns the name for `locale`, trying the exact code, then its language prefix.
    pub fn localized_name(&self, locale: &str) -> &str {
        self.locale_override(locale)
            .and_then(|o| o.name.as_deref())
            .unwrap_or(&self.name)
    }

    /// Returns the description for `locale`, falling back like [`Self::localized_name`].
    pub fn localized_description(&self, locale: &str) -> Option<&str> {
        self.locale_override(locale)
            .and_then(|o| o.description.as_deref())
            .or(self.description.as_deref())
    }

    fn locale_override(&self, locale: &str) -> Option<&LocaleOverride> {
        if let Some(found) = self.locales.get(locale) {
            return Some(found);
        }
        let language = locale.split(['-', '_']).next()?;
        self.locales.get(language)
    }

    pub fn has_grant(&self, grant: &str) -> bool {
        self.grant.iter().any(|g| g == grant)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceEntry> {
        self.resource.iter().find(|r| r.name == name)
    }
}
