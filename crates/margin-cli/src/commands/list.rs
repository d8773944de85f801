use crate::commands::common::{
    format_highlight_lines, highlight_to_list_item, CommandContext, HighlightListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    include_archived: bool,
    as_json: bool,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let service = ctx.service().await?;
    let highlights = service.list(&ctx.user, include_archived, limit, 0).await?;

    if as_json {
        let json_items = highlights
            .iter()
            .map(highlight_to_list_item)
            .collect::<Vec<HighlightListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_highlight_lines(&highlights) {
            println!("{line}");
        }
    }

    Ok(())
}
