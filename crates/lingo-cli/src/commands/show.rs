use lingo_core::Collection;

use crate::commands::common::{format_item_detail, normalize_item_id, Context};
use crate::error::CliError;

pub async fn run_show(
    context: &Context,
    collection: Collection,
    id: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let id = normalize_item_id(id)?;
    let library = context.open_local_library()?;
    let item = library
        .get_by_id(collection, &id)
        .await?
        .ok_or(CliError::ItemNotFound { collection, id })?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        for line in format_item_detail(&item) {
            println!("{line}");
        }
    }
    Ok(())
}
