use lingo_core::{Collection, Error};

use crate::commands::common::{flag_label, normalize_item_id, Context};
use crate::error::CliError;

pub async fn run_flag(
    context: &Context,
    collection: Collection,
    id: &str,
    value: bool,
) -> Result<(), CliError> {
    let id = normalize_item_id(id)?;
    let library = context.open_local_library()?;

    match library.set_local_flag(collection, &id, value).await {
        Ok(()) => {
            println!("{} {id}", flag_label(collection, value));
            Ok(())
        }
        Err(Error::NotFound(_)) => Err(CliError::ItemNotFound { collection, id }),
        Err(error) => Err(error.into()),
    }
}
