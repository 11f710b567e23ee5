pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod machine;
pub mod reserve;
pub mod search;
pub mod service;

pub use config::{load_config, LoginSection, MiscSection, SearchSection, TsmConfig, WarnSection};
pub use diff::{diff, ReservationDiff};
pub use error::{ConfigError, Result, RunError, RunResult};
pub use filter::{
    compile, FilterError, FilterSpec, QueryFilter, RangeFilter, RelativeOffset, TimeField,
    TimeRange,
};
pub use machine::Machine;
pub use reserve::{Disposition, ReservationEngine, ReserveReport, ReserveStats, WarningPolicy};
pub use search::{SearchCursor, Searcher};
pub use service::{
    parse_content_id, with_login_retry, ClientOptions, ContentRecord, ContentService, CookieJar,
    CookieJarError, Credentials, NiconicoClient, ReservationRecord, SearchRequest,
    ServiceEndpoints, ServiceError, ServiceResult, Session,
};
