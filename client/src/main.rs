//! Tether - sync two related models with a PocketBase instance, then save,
//! list, filter and download a file.

use tether_client::{Config, PocketBase};
use tether_engine::{
    FileUpload, ListQuery, ModelDescriptor, ModelRef, Record, RecordOptions, Relation,
    TypeSignature, Value,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn related_model() -> ModelDescriptor {
    ModelDescriptor::new("RelatedModel").field("name", TypeSignature::String)
}

fn example() -> ModelDescriptor {
    ModelDescriptor::new("Example")
        .field("title", TypeSignature::String)
        .field(
            "category",
            TypeSignature::enumeration(["Option 1", "Option 2", "Option 3"]),
        )
        .field_with_default("views", TypeSignature::Integer)
        .field_with_default("image", TypeSignature::optional(TypeSignature::file_or_name()))
        .field(
            "related",
            TypeSignature::optional(TypeSignature::Union(vec![
                TypeSignature::Reference(ModelRef::Model(related_model)),
                TypeSignature::String,
            ])),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_client=debug,tether_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Connecting to PocketBase at {}", config.url);
    let pb = PocketBase::connect(&config)?;
    let ctx = pb.context();

    // Related collection first so the relation target resolves
    let related = related_model();
    let example = example();
    for descriptor in [&related, &example] {
        let result = ctx.sync_descriptor(descriptor)?;
        tracing::info!(
            collection = %result.schema.name,
            action = ?result.action,
            "collection synced"
        );
    }

    let mut parent = Record::new().with("name", "Parent");
    ctx.save_record(&related, &mut parent)?;

    let mut record = Record::new()
        .with("title", "Hello from Tether")
        .with("category", Value::Enum("Option 1".into()))
        .with("views", 10)
        .with(
            "image",
            FileUpload::new("image_x1.png", b"\x89PNG\r\n\x1a\n".to_vec())
                .with_content_type("image/png"),
        )
        .with("related", Relation::Id(parent.meta.id.clone()));
    ctx.save_record(&example, &mut record)?;
    tracing::info!(id = %record.meta.id, "record saved");

    let page = ctx.list_records(&example, &ListQuery::page(1, 10).sort("-created"))?;
    for item in &page.items {
        println!("{} {:?}", item.meta.id, item.get("title"));
    }

    let popular = ctx.list_records(
        &example,
        &ListQuery::page(1, 10).filter("views >= 5").expand("related"),
    )?;
    for item in &popular.items {
        let parent = match item.get("related") {
            Some(Value::Relation(relation)) => relation
                .record()
                .and_then(|r| r.get("name"))
                .map(|name| format!("{name:?}")),
            _ => None,
        };
        println!("{} related to {:?}", item.meta.id, parent);
    }

    let stored = ctx.get_record(&example, &record.meta.id, &RecordOptions::default())?;
    println!("file url: {}", ctx.file_url(&example, &stored, "image")?);
    let bytes = ctx.record_file_contents(&example, &stored, "image")?;
    println!("downloaded {} bytes", bytes.len());

    Ok(())
}
