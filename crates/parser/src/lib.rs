pub mod availability;
pub mod html;

pub use availability::{AvailabilityParser, CourtRow};
pub use html::{Link, LoginForm, Row, Table};
