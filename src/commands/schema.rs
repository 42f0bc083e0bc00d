use super::CommandError;
use crate::pipeline::schema::SchemaRegistry;

pub fn handle_schema(tree: bool) -> Result<(), CommandError> {
    let registry = SchemaRegistry::canonical();
    let json = if tree {
        serde_json::to_string_pretty(&registry)?
    } else {
        serde_json::to_string_pretty(&registry.example_json())?
    };
    println!("{json}");
    Ok(())
}
