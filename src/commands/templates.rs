use std::io::Write;
use std::path::Path;

use super::{CommandError, TemplatesAction};
use crate::pipeline::templates::{SqliteTemplateStore, TemplateStore};

pub fn handle_templates(store_path: &Path, action: &TemplatesAction) -> Result<(), CommandError> {
    if !store_path.exists() {
        println!("No template store at {}.", store_path.display());
        return Ok(());
    }
    let store = SqliteTemplateStore::open(store_path)?;
    run_action(&store, action, &mut std::io::stdout())
}

fn run_action(
    store: &dyn TemplateStore,
    action: &TemplatesAction,
    out: &mut dyn Write,
) -> Result<(), CommandError> {
    match action {
        TemplatesAction::List { json } => {
            let templates = store.entries()?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&templates)?)?;
            } else if templates.is_empty() {
                writeln!(out, "No templates learned yet.")?;
            } else {
                writeln!(out, "Templates:\n")?;
                for t in templates {
                    writeln!(
                        out,
                        "  {} [{} | {} | {}] hits:{} schema:{} created:{}",
                        t.fingerprint,
                        t.descriptor.structure.as_str(),
                        t.descriptor.grade_format.as_str(),
                        t.layout_type().as_str(),
                        t.hit_count,
                        t.schema_version,
                        t.created_at.format("%Y-%m-%d %H:%M"),
                    )?;
                    if !t.descriptor.columns.is_empty() {
                        writeln!(out, "      columns: {}", t.descriptor.columns.join(", "))?;
                    }
                }
            }
        }
        TemplatesAction::Show { fingerprint } => match store.lookup(fingerprint)? {
            Some(t) => writeln!(out, "{}", t.rendered_prompt_body)?,
            None => writeln!(out, "No template with fingerprint {fingerprint}.")?,
        },
        TemplatesAction::Remove { fingerprint } => {
            if store.remove(fingerprint)? {
                writeln!(out, "Removed {fingerprint}.")?;
            } else {
                writeln!(out, "No template with fingerprint {fingerprint}.")?;
            }
        }
        TemplatesAction::Clear => {
            let count = store.len()?;
            store.clear()?;
            writeln!(out, "Removed {count} template(s).")?;
        }
    }
    Ok(())
}
