//! Login check handler.

use serde::Serialize;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Serialize)]
struct LoginSummary {
    profile: String,
    server: String,
    username: String,
    module: String,
    data_store: String,
}

pub fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let target = session.target();
    let module = session.service().module();

    let summary = LoginSummary {
        profile: target.profile.clone(),
        server: target.service.url.to_string(),
        username: target.service.credentials.username.clone(),
        module: module
            .as_ref()
            .map_or_else(|| target.service.module.clone(), |m| m.name.clone()),
        data_store: module.as_ref().map(|m| m.data_store.clone()).unwrap_or_default(),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &summary,
        |s| {
            output::detail_lines(
                &[
                    ("Profile", s.profile.as_str()),
                    ("Server", s.server.as_str()),
                    ("Username", s.username.as_str()),
                    ("Module", s.module.as_str()),
                    ("Data store", s.data_store.as_str()),
                ],
                color,
            )
        },
        |s| s.username.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
