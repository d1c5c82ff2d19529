pub mod rules;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use self::rules::{KeywordRule, LoginRules, LoginVerdict};
pub use self::session::{
    resolve_against_origin, Credentials, LoginState, LoginSuccess, SessionManager, SessionSettings,
    StateTransition,
};
pub use self::transport::{HttpTransport, ReqwestTransport};
