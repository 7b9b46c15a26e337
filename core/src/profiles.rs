use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ValidationError;

pub type ProfileId = Uuid;

/// Loosely typed profile fields as collected from a form or the command line.
pub type FieldBag = Map<String, Value>;

const NAME_FIELD: &str = "name";
const TYPE_FIELD: &str = "type";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Local,
    Aws,
    Cloud,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 3] = [ProfileKind::Local, ProfileKind::Aws, ProfileKind::Cloud];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Local => "local",
            ProfileKind::Aws => "aws",
            ProfileKind::Cloud => "cloud",
        }
    }

    /// Wire names of the variant fields, in form order.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ProfileKind::Local => &["host", "port", "username", "password", "ssl"],
            ProfileKind::Aws => &["serverName", "dataCenter", "tenant", "apiKey"],
            ProfileKind::Cloud => &[
                "connectionName",
                "environmentName",
                "serverName",
                "tm1AutomationUsername",
                "tm1AutomationPassword",
                "camNamespace",
            ],
        }
    }

    fn owns(self, field: &str) -> bool {
        self.required_fields().iter().any(|known| *known == field)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ProfileKind::Local),
            "aws" => Ok(ProfileKind::Aws),
            "cloud" => Ok(ProfileKind::Cloud),
            _ => Err(ValidationError::UnknownKind(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ConnectionSettings {
    Local {
        host: String,
        port: u16,
        username: String,
        password: String,
        #[serde(rename = "ssl")]
        ssl_enabled: bool,
    },
    Aws {
        server_name: String,
        data_center: String,
        tenant: String,
        api_key: String,
    },
    Cloud {
        connection_name: String,
        environment_name: String,
        server_name: String,
        #[serde(rename = "tm1AutomationUsername")]
        automation_username: String,
        #[serde(rename = "tm1AutomationPassword")]
        automation_password: String,
        #[serde(rename = "camNamespace")]
        namespace: String,
    },
}

impl ConnectionSettings {
    pub fn kind(&self) -> ProfileKind {
        match self {
            ConnectionSettings::Local { .. } => ProfileKind::Local,
            ConnectionSettings::Aws { .. } => ProfileKind::Aws,
            ConnectionSettings::Cloud { .. } => ProfileKind::Cloud,
        }
    }

    pub fn from_fields(kind: ProfileKind, fields: &FieldBag) -> Result<Self, ValidationError> {
        reject_foreign_fields(kind, fields)?;
        let settings = match kind {
            ProfileKind::Local => ConnectionSettings::Local {
                host: text(fields, kind, "host")?,
                port: port(fields, kind)?,
                username: text(fields, kind, "username")?,
                password: text(fields, kind, "password")?,
                ssl_enabled: flag(fields, kind, "ssl")?,
            },
            ProfileKind::Aws => ConnectionSettings::Aws {
                server_name: text(fields, kind, "serverName")?,
                data_center: text(fields, kind, "dataCenter")?,
                tenant: text(fields, kind, "tenant")?,
                api_key: text(fields, kind, "apiKey")?,
            },
            ProfileKind::Cloud => ConnectionSettings::Cloud {
                connection_name: text(fields, kind, "connectionName")?,
                environment_name: text(fields, kind, "environmentName")?,
                server_name: text(fields, kind, "serverName")?,
                automation_username: text(fields, kind, "tm1AutomationUsername")?,
                automation_password: text(fields, kind, "tm1AutomationPassword")?,
                namespace: text(fields, kind, "camNamespace")?,
            },
        };
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ConnectionSettings::Local {
                host,
                port,
                username,
                password,
                ssl_enabled: _,
            } => {
                require("host", host)?;
                if *port == 0 {
                    return Err(ValidationError::PortOutOfRange(0));
                }
                require("username", username)?;
                require("password", password)
            }
            ConnectionSettings::Aws {
                server_name,
                data_center,
                tenant,
                api_key,
            } => {
                require("serverName", server_name)?;
                require("dataCenter", data_center)?;
                require("tenant", tenant)?;
                require("apiKey", api_key)
            }
            ConnectionSettings::Cloud {
                connection_name,
                environment_name,
                server_name,
                automation_username,
                automation_password,
                namespace,
            } => {
                require("connectionName", connection_name)?;
                require("environmentName", environment_name)?;
                require("serverName", server_name)?;
                require("tm1AutomationUsername", automation_username)?;
                require("tm1AutomationPassword", automation_password)?;
                require("camNamespace", namespace)
            }
        }
    }

    /// Service root of the TM1 REST API the backend connects to.
    pub fn endpoint(&self) -> String {
        match self {
            ConnectionSettings::Local {
                host,
                port,
                ssl_enabled,
                ..
            } => {
                let scheme = if *ssl_enabled { "https" } else { "http" };
                format!("{scheme}://{host}:{port}")
            }
            ConnectionSettings::Aws {
                server_name,
                data_center,
                tenant,
                ..
            } => format!(
                "https://{data_center}.planninganalytics.saas.ibm.com\
                 /api/{tenant}/v0/tm1/{server_name}/"
            ),
            ConnectionSettings::Cloud {
                environment_name,
                server_name,
                ..
            } => format!(
                "https://{environment_name}.planning-analytics.ibmcloud.com/tm1/api/{server_name}"
            ),
        }
    }

    /// Field bag accepted by [`ConnectionSettings::from_fields`] for the same kind.
    pub fn to_fields(&self) -> FieldBag {
        let mut fields = FieldBag::new();
        let mut put = |key: &str, value: Value| {
            fields.insert(key.to_string(), value);
        };
        match self {
            ConnectionSettings::Local {
                host,
                port,
                username,
                password,
                ssl_enabled,
            } => {
                put("host", host.as_str().into());
                put("port", (*port).into());
                put("username", username.as_str().into());
                put("password", password.as_str().into());
                put("ssl", (*ssl_enabled).into());
            }
            ConnectionSettings::Aws {
                server_name,
                data_center,
                tenant,
                api_key,
            } => {
                put("serverName", server_name.as_str().into());
                put("dataCenter", data_center.as_str().into());
                put("tenant", tenant.as_str().into());
                put("apiKey", api_key.as_str().into());
            }
            ConnectionSettings::Cloud {
                connection_name,
                environment_name,
                server_name,
                automation_username,
                automation_password,
                namespace,
            } => {
                put("connectionName", connection_name.as_str().into());
                put("environmentName", environment_name.as_str().into());
                put("serverName", server_name.as_str().into());
                put("tm1AutomationUsername", automation_username.as_str().into());
                put("tm1AutomationPassword", automation_password.as_str().into());
                put("camNamespace", namespace.as_str().into());
            }
        }
        fields
    }
}

/// A validated, not yet stored profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub name: String,
    #[serde(flatten)]
    pub settings: ConnectionSettings,
}

impl ProfileDraft {
    pub fn new(
        name: impl Into<String>,
        settings: ConnectionSettings,
    ) -> Result<Self, ValidationError> {
        let draft = Self {
            name: name.into(),
            settings,
        };
        draft.validate()?;
        Ok(draft)
    }

    pub fn from_fields(kind: ProfileKind, fields: &FieldBag) -> Result<Self, ValidationError> {
        let name = match fields.get(NAME_FIELD) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField {
                    kind,
                    field: NAME_FIELD,
                });
            }
            Some(Value::String(name)) if name.trim().is_empty() => {
                return Err(ValidationError::EmptyDisplayName);
            }
            Some(Value::String(name)) => name.trim().to_string(),
            Some(other) => {
                return Err(ValidationError::InvalidValue {
                    field: NAME_FIELD,
                    reason: format!("expected text, got {other}"),
                });
            }
        };
        let settings = ConnectionSettings::from_fields(kind, fields)?;
        Ok(Self { name, settings })
    }

    /// Like [`ProfileDraft::from_fields`], reading the kind from the `type` field.
    pub fn parse(fields: &FieldBag) -> Result<Self, ValidationError> {
        let kind = match fields.get(TYPE_FIELD) {
            Some(Value::String(kind)) => kind.parse()?,
            Some(other) => return Err(ValidationError::UnknownKind(other.to_string())),
            None => return Err(ValidationError::UnknownKind(String::new())),
        };
        Self::from_fields(kind, fields)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }
        self.settings.validate()
    }

    pub fn kind(&self) -> ProfileKind {
        self.settings.kind()
    }

    pub fn to_fields(&self) -> FieldBag {
        let mut fields = self.settings.to_fields();
        fields.insert(NAME_FIELD.into(), self.name.as_str().into());
        fields.insert(TYPE_FIELD.into(), self.kind().as_str().into());
        fields
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    id: ProfileId,
    name: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    settings: ConnectionSettings,
}

impl ConnectionProfile {
    pub fn new(id: ProfileId, created_at: DateTime<Utc>, draft: ProfileDraft) -> Self {
        Self {
            id,
            name: draft.name,
            created_at,
            settings: draft.settings,
        }
    }

    pub fn id(&self) -> ProfileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn kind(&self) -> ProfileKind {
        self.settings.kind()
    }

    pub fn endpoint(&self) -> String {
        self.settings.endpoint()
    }

    pub fn draft(&self) -> ProfileDraft {
        ProfileDraft {
            name: self.name.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Same identity with new contents. The kind is fixed for a given id.
    pub fn revise(&self, draft: ProfileDraft) -> Result<Self, ValidationError> {
        if draft.kind() != self.kind() {
            return Err(ValidationError::KindMismatch {
                existing: self.kind(),
                requested: draft.kind(),
            });
        }
        Ok(Self::new(self.id, self.created_at, draft))
    }
}

/// Resolves profile ids to the profiles currently known to the caller.
pub trait ProfileLookup {
    fn resolve(&self, id: ProfileId) -> Option<&ConnectionProfile>;
}

impl ProfileLookup for [ConnectionProfile] {
    fn resolve(&self, id: ProfileId) -> Option<&ConnectionProfile> {
        self.iter().find(|profile| profile.id == id)
    }
}

impl ProfileLookup for Vec<ConnectionProfile> {
    fn resolve(&self, id: ProfileId) -> Option<&ConnectionProfile> {
        self.as_slice().resolve(id)
    }
}

fn reject_foreign_fields(kind: ProfileKind, fields: &FieldBag) -> Result<(), ValidationError> {
    let foreign = fields.keys().find(|key| {
        !kind.owns(key)
            && ProfileKind::ALL
                .iter()
                .any(|other| *other != kind && other.owns(key))
    });
    match foreign {
        Some(field) => Err(ValidationError::ForeignField {
            kind,
            field: field.clone(),
        }),
        None => Ok(()),
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}

fn text(
    fields: &FieldBag,
    kind: ProfileKind,
    field: &'static str,
) -> Result<String, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { kind, field }),
        Some(Value::String(value)) => {
            require(field, value)?;
            Ok(value.clone())
        }
        Some(other) => Err(ValidationError::InvalidValue {
            field,
            reason: format!("expected text, got {other}"),
        }),
    }
}

fn port(fields: &FieldBag, kind: ProfileKind) -> Result<u16, ValidationError> {
    const FIELD: &str = "port";
    let raw = match fields.get(FIELD) {
        None | Some(Value::Null) => {
            return Err(ValidationError::MissingField { kind, field: FIELD });
        }
        Some(Value::Number(number)) => {
            number
                .as_i64()
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: FIELD,
                    reason: format!("{number} is not an integer"),
                })?
        }
        Some(Value::String(value)) => {
            require(FIELD, value)?;
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::InvalidValue {
                    field: FIELD,
                    reason: format!("`{value}` is not an integer"),
                })?
        }
        Some(other) => {
            return Err(ValidationError::InvalidValue {
                field: FIELD,
                reason: format!("expected a number, got {other}"),
            });
        }
    };
    u16::try_from(raw)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(ValidationError::PortOutOfRange(raw))
}

fn flag(
    fields: &FieldBag,
    kind: ProfileKind,
    field: &'static str,
) -> Result<bool, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { kind, field }),
        Some(Value::Bool(value)) => Ok(*value),
        Some(Value::String(value)) => {
            require(field, value)?;
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(ValidationError::InvalidValue {
                    field,
                    reason: format!("`{value}` is not a boolean"),
                }),
            }
        }
        Some(other) => Err(ValidationError::InvalidValue {
            field,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    // Servers that write `datetime.utcnow().isoformat()` omit the offset.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|value| value.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|value| value.and_utc())
            })
    }
}
