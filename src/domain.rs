use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {kind} entity: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    User,
    Repo,
}

impl NodeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::User => "User",
            NodeLabel::Repo => "Repo",
        }
    }

    pub fn spec(self) -> &'static NodeSpec {
        match self {
            NodeLabel::User => &USER_SPEC,
            NodeLabel::Repo => &REPO_SPEC,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelKind {
    Owns,
    Contributor,
    Follows,
}

impl RelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelKind::Owns => "OWNS",
            RelKind::Contributor => "CONTRIBUTOR",
            RelKind::Follows => "FOLLOWS",
        }
    }
}

/// Per-label upsert descriptor: which property identifies a node of this
/// label and which properties an upsert carries.
pub struct NodeSpec {
    pub label: NodeLabel,
    pub match_property: &'static str,
    pub properties: &'static [&'static str],
}

pub static USER_SPEC: NodeSpec = NodeSpec {
    label: NodeLabel::User,
    match_property: "username",
    properties: &[
        "username",
        "external_id",
        "user_url",
        "followers_url",
        "following_url",
        "repos_url",
        "type",
        "site_admin",
    ],
};

pub static REPO_SPEC: NodeSpec = NodeSpec {
    label: NodeLabel::Repo,
    match_property: "name",
    properties: &[
        "external_id",
        "name",
        "full_name",
        "html_url",
        "url",
        "contributors_url",
        "issues_url",
        "languages_url",
    ],
};

/// One endpoint of a relationship upsert: how to match the node and the
/// name of the bound statement parameter.
#[derive(Clone, Debug)]
pub struct RelationshipEnd {
    pub label: NodeLabel,
    pub match_property: &'static str,
    pub param: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "login")]
    pub username: String,
    #[serde(rename = "id")]
    pub external_id: i64,
    #[serde(rename = "url", default)]
    pub user_url: String,
    #[serde(default)]
    pub followers_url: String,
    #[serde(default)]
    pub following_url: String,
    #[serde(default)]
    pub repos_url: String,
    #[serde(rename = "type", default)]
    pub user_type: String,
    #[serde(default)]
    pub site_admin: bool,
}

impl UserRecord {
    pub fn decode(raw: &Value) -> Result<Self, DecodeError> {
        serde_json::from_value(raw.clone()).map_err(|source| DecodeError::Malformed {
            kind: "user",
            source,
        })
    }

    pub fn node_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("username".to_string(), json!(self.username));
        props.insert("external_id".to_string(), json!(self.external_id));
        props.insert("user_url".to_string(), json!(self.user_url));
        props.insert("followers_url".to_string(), json!(self.followers_url));
        props.insert("following_url".to_string(), json!(self.following_url));
        props.insert("repos_url".to_string(), json!(self.repos_url));
        props.insert("type".to_string(), json!(self.user_type));
        props.insert("site_admin".to_string(), json!(self.site_admin));
        props
    }

    pub fn endpoint(&self, param: &'static str) -> RelationshipEnd {
        RelationshipEnd {
            label: NodeLabel::User,
            match_property: USER_SPEC.match_property,
            param,
            value: self.username.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RepositoryRecord {
    #[serde(rename = "id")]
    pub external_id: i64,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub owner: UserRecord,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub contributors_url: String,
    #[serde(default)]
    pub issues_url: String,
    #[serde(default)]
    pub languages_url: String,
}

impl RepositoryRecord {
    pub fn decode(raw: &Value) -> Result<Self, DecodeError> {
        serde_json::from_value(raw.clone()).map_err(|source| DecodeError::Malformed {
            kind: "repository",
            source,
        })
    }

    /// The owner is a node of its own, not a repo property.
    pub fn node_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("external_id".to_string(), json!(self.external_id));
        props.insert("name".to_string(), json!(self.name));
        props.insert("full_name".to_string(), json!(self.full_name));
        props.insert("html_url".to_string(), json!(self.html_url));
        props.insert("url".to_string(), json!(self.url));
        props.insert("contributors_url".to_string(), json!(self.contributors_url));
        props.insert("issues_url".to_string(), json!(self.issues_url));
        props.insert("languages_url".to_string(), json!(self.languages_url));
        props
    }

    pub fn endpoint(&self, param: &'static str) -> RelationshipEnd {
        RelationshipEnd {
            label: NodeLabel::Repo,
            match_property: REPO_SPEC.match_property,
            param,
            value: self.name.clone(),
        }
    }
}
