use super::{Store, StoreInfo};
use crate::Result;
use url::Url;

/// A backend's entry in [`STORE_REGISTRY`]; its scheme is `info.name`.
#[doc(hidden)]
pub struct StoreRegistration {
    pub info: StoreInfo,
    pub open: fn(&Url) -> Result<Box<dyn Store>>,
}

#[doc(hidden)]
#[linkme::distributed_slice]
pub static STORE_REGISTRY: [StoreRegistration];

/// Registers a backend under its URI scheme.
///
/// The config is built with `TryFrom<&Url>`, the store with `new(config)`.
///
/// ```ignore
/// register_store!(FileStore(FileConfig) as "file", "JSON files", ["file:///var/lib/depspec"]);
/// ```
#[doc(hidden)]
#[macro_export]
macro_rules! register_store {
    ($store:ident($config:ty) as $scheme:literal, $description:literal, [$($example:literal),* $(,)?]) => {
        impl $store {
            const STORE_NAME: &'static str = $scheme;
        }

        const _: () = {
            #[linkme::distributed_slice($crate::store::STORE_REGISTRY)]
            static REGISTRATION: $crate::store::StoreRegistration = $crate::store::StoreRegistration {
                info: $crate::store::StoreInfo {
                    name: $scheme,
                    description: $description,
                    examples: &[$($example),*],
                },
                open: |url| Ok(Box::new(<$store>::new(<$config>::try_from(url)?))),
            };
        };
    };
}
