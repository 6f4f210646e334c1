/// Category assigned when the category suggestion is missing or unreliable
pub const UNKNOWN_CATEGORY_ID: &str = "uncategorized";

/// Suggestions below this confidence are replaced by the unknown category
pub const LOW_CONFIDENCE_FLOOR: f64 = 0.5;

/// Name of the shared origin used when no family member matches an account owner
pub const SHARED_ORIGIN_NAME: &str = "Common";

/// Description used when a transaction carries no usable text at all
pub const DESCRIPTION_PLACEHOLDER: &str = "Bank transaction";

/// Date format used on the provider wire and in lookback windows
pub const DATE_FORMAT: &str = "%Y-%m-%d";
