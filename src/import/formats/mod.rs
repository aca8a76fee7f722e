use super::registry::FormatRegistry;

mod delimited;
mod spreadsheet;

pub use delimited::{Compression, Delimited};
pub use spreadsheet::Spreadsheet;

/// Formats available out of the box, in sniffing order.
pub fn builtin_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    registry.register("csv", Delimited::csv());
    registry.register("tsv", Delimited::tsv());
    registry.register("csv.gz", Delimited::csv_gz());
    registry.register("tsv.gz", Delimited::tsv_gz());
    registry.register("excel", Spreadsheet::new());
    registry
}
