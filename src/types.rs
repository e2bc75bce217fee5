/// Identifier of the site a link batch belongs to.
/// Examples: `bloomberg`, `reuters`, `default`
pub type SiteId = String;
/// Url of the page the links were extracted from.
/// Example: `https://www.bloomberg.com/markets/stocks`
pub type PageUrl = String;
/// Link target, the dedup component of a record.
/// Example: `https://www.bloomberg.com/news/articles/2025-02-25/item`
pub type Href = String;
/// Filesystem-safe stem grouping the records of one site/page pair.
/// Examples: `bloomberg_markets`, `default`, `news`
pub type StorageKey = String;
/// Membership key combining sanitized site id and href.
/// Example: `bloomberg|https://www.bloomberg.com/news/articles/item`
pub type MembershipKey = String;
/// Warning/log message text.
/// Examples: `[link_ledger] skipping corrupted parquet row`
pub type LogMessage = String;
