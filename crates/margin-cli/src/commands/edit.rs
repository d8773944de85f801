use margin_core::models::HighlightDraft;

use crate::commands::common::{
    capture_editor_input_with_initial, describe_sync, normalize_content,
    normalize_highlight_identifier, resolve_highlight, CommandContext,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    text: Option<&str>,
    html: Option<String>,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let query = normalize_highlight_identifier(id)?;
    let service = ctx.service().await?;
    let highlight = resolve_highlight(&query, &service, &ctx.user).await?;

    let edited_text = match text {
        Some(text) => normalize_content(text),
        None => capture_editor_input_with_initial(&highlight.text)?,
    };
    let Some(edited_text) = edited_text else {
        return Err(CliError::EmptyEditedContent);
    };

    // Stored markup only survives while the plain text it renders is unchanged.
    let html = match html {
        Some(html) => Some(html),
        None if edited_text == highlight.text => highlight.html.clone(),
        None => None,
    };

    let draft = HighlightDraft {
        text: edited_text,
        html,
        source: highlight.source.clone(),
        author: highlight.author.clone(),
    };

    let change = service.update(&ctx.user, &highlight.id, draft).await?;
    println!("{}", change.highlight.id);
    eprintln!("{}", describe_sync(&change.sync));
    Ok(())
}
