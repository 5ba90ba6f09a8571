//! Entity command handlers.

use tabled::Tabled;

use obis_core::{EntityProperty, IpadEntity, parse_children, parse_properties};

use crate::cli::{EntitiesArgs, EntitiesCommand, GlobalOpts, ListArgs};
use crate::error::CliError;
use crate::output;

use super::Session;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Perm ID")]
    perm_id: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Header")]
    header: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

impl From<&IpadEntity> for EntityRow {
    fn from(e: &IpadEntity) -> Self {
        Self {
            perm_id: e.perm_id().into(),
            identifier: e.identifier().into(),
            group: e.group().into(),
            header: e.summary_header().into(),
            summary: truncate(e.summary(), 48),
        }
    }
}

#[derive(Tabled)]
struct ChildRow {
    #[tabled(rename = "Perm ID")]
    perm_id: String,
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_owned(),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Apply `--group` and `--limit` to a listing, keeping server order.
fn apply_list_args(entities: Vec<IpadEntity>, args: &ListArgs) -> Vec<IpadEntity> {
    let group = args.group.as_deref();
    entities
        .into_iter()
        .filter(|e| group.is_none_or(|g| e.group().eq_ignore_ascii_case(g)))
        .take(args.limit.unwrap_or(usize::MAX))
        .collect()
}

/// Find an entity by perm ID in the full listing.
///
/// Drill and detail requests need the entity's refcon, which only the
/// server's own listing carries.
async fn resolve_entity(session: &Session, perm_id: &str) -> Result<IpadEntity, CliError> {
    let all = session.run(session.service().list_all_entities()).await?;
    all.into_iter()
        .find(|e| e.perm_id() == perm_id)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "entity".into(),
            identifier: perm_id.into(),
            list_command: "entities list".into(),
        })
}

fn render_entities(entities: &[IpadEntity], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(
        &global.output,
        entities,
        |e| EntityRow::from(e),
        |e| e.perm_id().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail_view(entity: &IpadEntity, color: bool) -> String {
    let mut out = output::detail_lines(
        &[
            ("Perm ID", entity.perm_id()),
            ("Identifier", entity.identifier()),
            ("Group", entity.group()),
            ("Header", entity.summary_header()),
            ("Summary", entity.summary()),
            ("Image", entity.image_url()),
        ],
        color,
    );

    match parse_properties(entity) {
        Ok(properties) if !properties.is_empty() => {
            let fields: Vec<(&str, &str)> = properties
                .iter()
                .map(|EntityProperty { key, label, value }| {
                    ((if label.is_empty() { key } else { label }).as_str(), value.as_str())
                })
                .collect();
            out.push_str("\n\n");
            out.push_str(&output::detail_lines(&fields, color));
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "showing properties undecoded");
            out.push_str("\n\n");
            out.push_str(entity.properties());
        }
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    session: &Session,
    args: EntitiesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let service = session.service();

    match args.command {
        EntitiesCommand::List(list) => {
            let all = session.run(service.list_all_entities()).await?;
            render_entities(&apply_list_args(all, &list), global)
        }

        EntitiesCommand::Roots(list) => {
            let roots = session.run(service.list_root_level_entities()).await?;
            render_entities(&apply_list_args(roots, &list), global)
        }

        EntitiesCommand::Drill { perm_id } => {
            let parent = resolve_entity(session, &perm_id).await?;
            let children = session.run(service.drill_on_entity(&parent)).await?;
            render_entities(&children, global)
        }

        EntitiesCommand::Detail { perm_id } => {
            let entity = resolve_entity(session, &perm_id).await?;
            let detail = session.run(service.details_for_entity(&entity)).await?;
            let color = output::should_color(&global.color);
            let out = output::render_single(
                &global.output,
                &detail,
                |e| detail_view(e, color),
                |e| e.perm_id().to_owned(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        EntitiesCommand::Children { perm_id } => {
            let entity = resolve_entity(session, &perm_id).await?;
            let detail = session.run(service.details_for_entity(&entity)).await?;
            let children = parse_children(&detail).map_err(|e| session.target().error(e))?;
            let out = output::render_list(
                &global.output,
                &children,
                |id| ChildRow { perm_id: id.clone() },
                String::clone,
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
