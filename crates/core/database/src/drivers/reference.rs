use std::{collections::HashMap, sync::Arc};

use futures::lock::Mutex;
use serde_json::Value;

use crate::Image;

/// Image held in memory by the reference implementation
#[derive(Clone, Debug)]
pub struct ReferenceImage {
    pub image: Image,
    pub data: Vec<u8>,
}

database_derived!(
    /// Reference implementation
    ///
    /// Issues are kept as raw documents so that partial records behave
    /// the same way they would in a document store.
    #[derive(Default)]
    pub struct ReferenceDb {
        pub issues: Arc<Mutex<HashMap<String, Value>>>,
        pub images: Arc<Mutex<Vec<ReferenceImage>>>,
    }
);

impl ReferenceDb {
    /// Remove every issue and image
    pub async fn clear(&self) {
        self.issues.lock().await.clear();
        self.images.lock().await.clear();
    }
}
