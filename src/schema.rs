/// Column-name constants for the registration tables.
/// Single source of truth for CSV input, DataFrame export and the Python binding.

// ── Registration record columns ─────────────────────────────────────────────
pub mod record {
    pub const DATE: &str = "date";
    pub const CATEGORY: &str = "category";
    pub const MANUFACTURER: &str = "manufacturer";
    pub const REGISTRATIONS: &str = "registrations";

    pub const YEAR: &str = "year";
    pub const QUARTER: &str = "quarter";
    pub const MONTH: &str = "month";

    pub const REQUIRED: [&str; 4] = [DATE, CATEGORY, MANUFACTURER, REGISTRATIONS];

    /// Present in some inputs, never trusted.
    pub const DERIVED: [&str; 3] = [YEAR, QUARTER, MONTH];
}

// ── Growth table columns ────────────────────────────────────────────────────
pub mod growth {
    pub const CATEGORY: &str = "category";
    pub const MANUFACTURER: &str = "manufacturer";
    pub const YEAR: &str = "year";
    pub const QUARTER: &str = "quarter";
    pub const PERIOD: &str = "period";
    pub const PREVIOUS_YEAR: &str = "previous_year";
    pub const PREVIOUS_PERIOD: &str = "previous_period";
    pub const CURRENT_TOTAL: &str = "current_total";
    pub const PREVIOUS_TOTAL: &str = "previous_total";
    pub const YOY_GROWTH_PCT: &str = "yoy_growth_pct";
    pub const QOQ_GROWTH_PCT: &str = "qoq_growth_pct";
}

// ── Category summary columns ────────────────────────────────────────────────
pub mod summary {
    pub const CATEGORY: &str = "category";
    pub const YEAR: &str = "year";
    pub const TOTAL_REGISTRATIONS: &str = "total_registrations";
    pub const ROW_COUNT: &str = "row_count";
}

// ── Vehicle categories ──────────────────────────────────────────────────────
pub mod category {
    pub const TWO_WHEELER: &str = "2W";
    pub const THREE_WHEELER: &str = "3W";
    pub const FOUR_WHEELER: &str = "4W";
    pub const COMMERCIAL: &str = "CV";
    pub const ELECTRIC: &str = "EV";

    pub const KNOWN: [&str; 5] = [
        TWO_WHEELER,
        THREE_WHEELER,
        FOUR_WHEELER,
        COMMERCIAL,
        ELECTRIC,
    ];
}
