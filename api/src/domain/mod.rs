//! Domain models, queries and the persistence seam

pub mod accounts;
pub mod platform;
pub mod posts;
pub mod store;

pub use accounts::{ConnectedAccount, NewConnectedAccount};
pub use platform::{MediaKind, Platform};
pub use posts::{
    NewPost, PlatformFailure, PlatformResponses, PlatformSuccess, PostStatus, ScheduledPost,
};
pub use store::{PgStore, PublishStore, StoreError};
