//! Column names of the impression log and the derived feature table

/// Stable row label attached at load time.
pub const ROW_ID: &str = "row_id";

pub const SESSION_ID: &str = "session_id";
pub const DATE_TIME: &str = "DateTime";
pub const USER_ID: &str = "user_id";
pub const PRODUCT: &str = "product";
pub const CAMPAIGN_ID: &str = "campaign_id";
pub const WEBPAGE_ID: &str = "webpage_id";
pub const PRODUCT_CATEGORY_1: &str = "product_category_1";
pub const PRODUCT_CATEGORY_2: &str = "product_category_2";
pub const PRODUCT_CATEGORY: &str = "product_category";
pub const USER_GROUP_ID: &str = "user_group_id";
pub const GENDER: &str = "gender";
pub const AGE_LEVEL: &str = "age_level";
pub const USER_DEPTH: &str = "user_depth";
pub const CITY_DEVELOPMENT_INDEX: &str = "city_development_index";
pub const VAR_1: &str = "var_1";
pub const IS_CLICK: &str = "is_click";

/// Label value marking rows whose click outcome is unknown.
pub const UNLABELED: i64 = -1;

/// Placeholder used for null categories and for features absent at scoring time.
pub const MISSING_PLACEHOLDER: &str = "missing";

pub const DAY: &str = "Day";
pub const HOUR: &str = "Hour";
pub const MINUTE: &str = "Minute";
pub const WEEKDAY: &str = "weekday";
pub const CAMPAIGN_DURATION_HOURS: &str = "campaign_duration_hours";

/// Columns of the raw record, in file order.
pub const RECORD_COLUMNS: [&str; 15] = [
    SESSION_ID,
    DATE_TIME,
    USER_ID,
    PRODUCT,
    CAMPAIGN_ID,
    WEBPAGE_ID,
    PRODUCT_CATEGORY_1,
    PRODUCT_CATEGORY_2,
    USER_GROUP_ID,
    GENDER,
    AGE_LEVEL,
    USER_DEPTH,
    CITY_DEVELOPMENT_INDEX,
    VAR_1,
    IS_CLICK,
];

/// Columns handed to the classifier as categoricals.
pub const CATEGORICAL_COLUMNS: [&str; 6] = [
    PRODUCT_CATEGORY,
    PRODUCT,
    GENDER,
    CAMPAIGN_ID,
    WEBPAGE_ID,
    USER_GROUP_ID,
];

/// Subset that is one-hot encoded when dummies are enabled.
pub const DUMMY_COLUMNS: [&str; 5] = [PRODUCT, CAMPAIGN_ID, WEBPAGE_ID, PRODUCT_CATEGORY, GENDER];

/// Columns that receive smoothed and blended CTR features.
pub const CTR_COLUMNS: [&str; 3] = [USER_ID, PRODUCT, CAMPAIGN_ID];

pub const CALENDAR_COLUMNS: [&str; 4] = [DAY, HOUR, MINUTE, WEEKDAY];

/// Identifier and timestamp columns removed once features are derived.
pub const DROPPED_AFTER_FEATURES: [&str; 3] = [DATE_TIME, SESSION_ID, USER_ID];

/// Returns true when the table has a column with this name.
pub fn has_column(df: &polars::prelude::DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Fail with `MissingColumn` on the first raw record column absent from `df`.
///
/// `label` replaces `IS_CLICK`; `None` skips the label, as for an unlabelled
/// external table.
pub fn require_record_columns(
    df: &polars::prelude::DataFrame,
    label: Option<&str>,
) -> anyhow::Result<()> {
    let mut required: Vec<&str> = RECORD_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != IS_CLICK)
        .collect();
    required.extend(label);
    match required.into_iter().find(|name| !has_column(df, name)) {
        Some(name) => Err(super::error::PipelineError::MissingColumn(name.to_string()).into()),
        None => Ok(()),
    }
}
