use clap::{Args, Parser, Subcommand};
use pamigrate_core::{
    objects::{ObjectRef, ObjectType},
    profiles::FieldBag,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    name = "pamigrate",
    version,
    about = "Migrate Planning Analytics objects between environments"
)]
pub struct Cli {
    /// Base URL of the migration backend.
    #[arg(long, global = true, env = "PAMIGRATE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Operator name; defaults to the last login.
    #[arg(long, short, global = true)]
    pub user: Option<String>,

    #[arg(
        long,
        global = true,
        env = "PAMIGRATE_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and remember the operator.
    Login {
        /// Keep the password in the OS keychain.
        #[arg(long)]
        remember: bool,
    },
    /// Create an operator account.
    Register {
        #[arg(long)]
        remember: bool,
    },
    /// Forget the operator and any remembered password.
    Logout,
    #[command(subcommand)]
    Profiles(ProfilesCommand),
    /// Test a stored profile, a field bag, or a stored profile with overrides.
    Test {
        profile: Option<String>,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// List the objects of an environment.
    Objects { source: String },
    Migrate(MigrateArgs),
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    List,
    Add {
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Change fields of a profile; unset fields keep their value.
    Update {
        profile: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Remove { profile: String },
}

#[derive(Debug, Args)]
pub struct FieldArgs {
    /// Profile field as `key=value`, e.g. `--set type=local --set port=8010`.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

impl FieldArgs {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Writes the fields over `bag`, later occurrences winning.
    pub fn apply_to(&self, bag: &mut FieldBag) {
        for (key, value) in &self.fields {
            bag.insert(key.clone(), Value::String(value.clone()));
        }
    }

    pub fn to_bag(&self) -> FieldBag {
        let mut bag = FieldBag::new();
        self.apply_to(&mut bag);
        bag
    }
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Source profile, by id or name.
    #[arg(long)]
    pub source: String,

    /// Target profile, by id or name.
    #[arg(long)]
    pub target: String,

    /// Object to migrate as `type:name`, e.g. `cube:Sales`.
    #[arg(long = "object", value_name = "TYPE:NAME", value_parser = parse_object)]
    pub objects: Vec<ObjectRef>,

    /// Migrate every object of a type.
    #[arg(long = "all", value_name = "TYPE", value_parser = parse_object_type)]
    pub all: Vec<ObjectType>,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_object(raw: &str) -> Result<ObjectRef, String> {
    let (object_type, name) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected TYPE:NAME, got `{raw}`"))?;
    let object_type = parse_object_type(object_type)?;
    if name.trim().is_empty() {
        return Err(format!("missing object name in `{raw}`"));
    }
    Ok(ObjectRef::new(object_type, name))
}

fn parse_object_type(raw: &str) -> Result<ObjectType, String> {
    raw.parse().map_err(|err: pamigrate_core::ValidationError| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_split_on_the_first_equals_sign() {
        assert_eq!(
            parse_field("password=a=b").unwrap(),
            ("password".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_field("name=").unwrap(), ("name".into(), String::new()));
        assert!(parse_field("port").is_err());
        assert!(parse_field("=8010").is_err());
    }

    #[test]
    fn objects_need_a_type_and_a_name() {
        assert_eq!(
            parse_object("cube:Sales Plan").unwrap(),
            ObjectRef::new(ObjectType::Cube, "Sales Plan")
        );
        assert_eq!(
            parse_object("dim:Region").unwrap(),
            ObjectRef::new(ObjectType::Dimension, "Region")
        );
        assert!(parse_object("Sales").is_err());
        assert!(parse_object("cube:").is_err());
        assert!(parse_object("view:Default").is_err());
    }

    #[test]
    fn later_fields_win() {
        let cli = Cli::try_parse_from([
            "pamigrate",
            "profiles",
            "add",
            "--set",
            "name=Dev",
            "--set",
            "name=Dev 2",
            "--set",
            "port=8010",
        ])
        .unwrap();
        let Command::Profiles(ProfilesCommand::Add { fields }) = cli.command else {
            panic!("parsed the wrong command");
        };
        let bag = fields.to_bag();
        assert_eq!(bag["name"], "Dev 2");
        assert_eq!(bag["port"], "8010");
    }

    #[test]
    fn migrate_collects_objects_and_types() {
        let cli = Cli::try_parse_from([
            "pamigrate",
            "migrate",
            "--source",
            "Dev",
            "--target",
            "Prod",
            "--object",
            "cube:Sales",
            "--all",
            "dimensions",
        ])
        .unwrap();
        let Command::Migrate(args) = cli.command else {
            panic!("parsed the wrong command");
        };
        assert_eq!(args.objects, vec![ObjectRef::new(ObjectType::Cube, "Sales")]);
        assert_eq!(args.all, vec![ObjectType::Dimension]);
    }
}
