use lingo_core::models::CachePage;
use lingo_core::{Collection, ItemFilter, Library};

use crate::commands::common::{format_item_lines, item_to_list_item, Context, ItemListItem};
use crate::error::CliError;

pub struct ListArgs {
    pub collection: Collection,
    pub page: usize,
    pub page_size: usize,
    pub search: Option<String>,
    pub category: Option<String>,
    pub flagged: bool,
}

impl ListArgs {
    pub fn filter(&self) -> ItemFilter {
        let mut filter = ItemFilter::default();
        if let Some(search) = self.search.as_deref() {
            filter = filter.with_search(search);
        }
        if let Some(category) = self.category.as_deref() {
            filter = filter.with_category(category);
        }
        if self.flagged {
            filter = filter.with_local_flag(true);
        }
        filter
    }
}

pub async fn run_list(context: &Context, args: ListArgs, as_json: bool) -> Result<(), CliError> {
    let library = context.open_local_library()?;
    let page = list_page(&library, &args).await?;

    if as_json {
        let json_items = page
            .items
            .iter()
            .map(item_to_list_item)
            .collect::<Vec<ItemListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No cached {} match.", args.collection);
    }
    for line in format_item_lines(&page.items) {
        println!("{line}");
    }
    println!("{}", page_footer(&page));
    Ok(())
}

pub async fn list_page(library: &Library, args: &ListArgs) -> Result<CachePage, CliError> {
    if args.page_size == 0 {
        return Err(CliError::InvalidPageSize);
    }
    Ok(library
        .fetch(args.collection, args.page, args.page_size, args.filter())
        .await?)
}

pub fn page_footer(page: &CachePage) -> String {
    let pages = page.total.div_ceil(page.page_size.max(1)).max(1);
    let mut footer = format!(
        "Page {}/{} ({} items)",
        page.page + 1,
        pages,
        page.total
    );
    if page.is_stale {
        footer.push_str(" - cache is stale, run `lingo sync`");
    }
    footer
}
