pub mod callback;
pub mod driver;
pub mod error;
pub mod machine;
pub mod state;
pub mod window;

pub use callback::CallbackPage;
pub use driver::{AuthorizationSource, CodeExchange, ConnectDriver, MessagePort, Settled};
pub use error::{ConnectError, ConnectResult};
pub use machine::{
    BlockedPopupPolicy, ConnectionStatus, Handshake, HandshakeConfig, HandshakeEvent, Launch,
    MissingStatePolicy, Outcome, Timings,
};
pub use state::{OAuthState, PendingAuthorization};
pub use window::{
    Browser, CallbackParams, Location, MemoryLocation, PopupHandle, PopupRefusal, WindowMessage,
    POPUP_NAME,
};
