use std::fmt;

use super::{LoadState, Loadable};
use crate::provider::{ImageHandle, ImageId};
use crate::session::Context;

pub struct Image {
    entity: Loadable<ImageHandle>,
    id: ImageId,
}

impl Image {
    /// Asks the provider for the image behind `id`. The provider hands back a
    /// handle with our reference already taken.
    pub fn create(ctx: &Context, id: &ImageId) -> Option<Self> {
        let handle = ctx.provider().with_mut(|p| p.image_create(id)).flatten()?;
        let mut entity = Loadable::new(ctx);
        entity.adopt(handle, None);
        Some(Self {
            entity,
            id: id.clone(),
        })
    }

    pub fn id(&self) -> &ImageId {
        &self.id
    }

    pub fn handle(&self) -> Option<ImageHandle> {
        self.entity.handle()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    /// Encoded image bytes, once loaded.
    pub fn data(&self) -> Option<Vec<u8>> {
        if self.state() != LoadState::Loaded {
            return None;
        }
        self.entity.query(|p, h| p.image_data(h))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("handle", &self.handle())
            .finish()
    }
}
