//! Integration tests for the PocketBase client.
//!
//! The `live_tests` module requires a running PocketBase instance and is
//! ignored by default. Set POCKETBASE_URL, POCKETBASE_USERNAME and
//! POCKETBASE_PASSWORD and run with `--ignored`.

use std::collections::HashMap;
use std::time::Duration;
use tether_client::{ClientError, Config, ConfigError, PocketBase};
use tether_engine::{Backend, BackendError};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingUrl);

        let err = Config::from_lookup(lookup(&[("POCKETBASE_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn defaults() {
        let config =
            Config::from_lookup(lookup(&[("POCKETBASE_URL", "http://127.0.0.1:8090/")])).unwrap();

        assert_eq!(config.url, "http://127.0.0.1:8090");
        assert_eq!(config.username, None);
        assert_eq!(config.auth_collection, "_superusers");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config, Config::new("http://127.0.0.1:8090"));
    }

    #[test]
    fn full_configuration() {
        let config = Config::from_lookup(lookup(&[
            ("POCKETBASE_URL", "https://pb.example.com"),
            ("POCKETBASE_USERNAME", "admin@example.com"),
            ("POCKETBASE_PASSWORD", "secret"),
            ("POCKETBASE_AUTH_COLLECTION", "staff"),
            ("POCKETBASE_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.username.as_deref(), Some("admin@example.com"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.auth_collection, "staff");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values() {
        let err = Config::from_lookup(lookup(&[
            ("POCKETBASE_URL", "http://localhost:8090"),
            ("POCKETBASE_USERNAME", "admin@example.com"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::IncompleteCredentials);

        let err = Config::from_lookup(lookup(&[
            ("POCKETBASE_URL", "http://localhost:8090"),
            ("POCKETBASE_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn api_error_message_is_extracted() {
        let err = ClientError::from_response(
            400,
            r#"{"status":400,"message":"Failed to create record.","data":{}}"#,
        );
        assert!(matches!(
            err,
            ClientError::Api { status: 400, ref message } if message == "Failed to create record."
        ));

        let err = ClientError::from_response(502, "Bad Gateway");
        assert!(matches!(err, ClientError::Api { ref message, .. } if message == "Bad Gateway"));
    }

    #[test]
    fn not_found_maps_to_backend_not_found() {
        let err: BackendError = ClientError::from_response(
            404,
            r#"{"status":404,"message":"The requested resource wasn't found.","data":{}}"#,
        )
        .into();
        assert!(err.is_not_found());

        let err: BackendError = ClientError::from_response(403, "{}").into();
        assert!(matches!(err, BackendError::Status { status: 403, .. }));

        let err: BackendError = ClientError::Decode("bad json".into()).into();
        assert_eq!(err, BackendError::Decode("bad json".into()));
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let config = Config {
            timeout: Duration::from_millis(200),
            ..Config::new("http://127.0.0.1:9")
        };
        let pb = PocketBase::new(&config).unwrap();

        let err = pb.get_collection("items").unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(!err.is_not_found());
    }
}

#[cfg(test)]
mod live_tests {
    use super::*;
    use tether_engine::{
        FileUpload, ListQuery, ModelDescriptor, ReconcileAction, Record, RecordOptions,
        TypeSignature, Value,
    };

    fn connect() -> PocketBase {
        dotenvy::dotenv().ok();
        let config = Config::from_env().expect("POCKETBASE_URL must be set");
        PocketBase::connect(&config).expect("failed to connect")
    }

    fn descriptor(collection: &str) -> ModelDescriptor {
        ModelDescriptor::new("LiveItem")
            .collection(collection)
            .field("name", TypeSignature::String)
            .field_with_default("count", TypeSignature::Integer)
            .field_with_default("image", TypeSignature::file_or_name())
    }

    #[test]
    #[ignore]
    fn sync_save_and_fetch() {
        let pb = connect();
        let ctx = pb.context();
        let collection = format!("tether_live_{}", std::process::id());
        let descriptor = descriptor(&collection);

        let created = ctx.sync_descriptor(&descriptor).unwrap();
        assert_eq!(created.action, ReconcileAction::Created);
        let again = ctx.sync_descriptor(&descriptor).unwrap();
        assert_eq!(again.action, ReconcileAction::Unchanged);

        let mut record = Record::new()
            .with("name", "live")
            .with("count", 2)
            .with("image", FileUpload::new("pixel.png", vec![0u8; 8]));
        ctx.save_record(&descriptor, &mut record).unwrap();

        let fetched = ctx
            .get_record(&descriptor, &record.meta.id, &RecordOptions::default())
            .unwrap();
        assert_eq!(fetched.get("name"), Some(&Value::Text("live".into())));
        assert_eq!(
            ctx.record_file_contents(&descriptor, &fetched, "image").unwrap(),
            vec![0u8; 8]
        );

        let page = ctx.list_records(&descriptor, &ListQuery::default()).unwrap();
        assert_eq!(page.items.len(), 1);

        pb.delete_collection(&collection).unwrap();
    }

    #[test]
    #[ignore]
    fn superusers_are_protected() {
        let pb = connect();
        let users = ModelDescriptor::new("Admin")
            .collection("_superusers")
            .field("nickname", TypeSignature::String);

        let err = pb.context().sync_descriptor(&users).unwrap_err();
        assert_eq!(err.kind(), tether_engine::ErrorKind::ProtectedCollection);
    }
}
