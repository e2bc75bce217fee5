use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    link_ledger::apps::run_aggregate_links(std::env::args().skip(1))
}
