//! The image-generation collaborator and batch resolution of image prompts.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};

use super::instruction::ProposedNode;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ImageError {
	#[error("image generation failed: {0}")]
	Generation(String),

	#[error("image upload failed: {0}")]
	Upload(String),
}

/// Where an uploaded image ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
	pub url: String,
	pub storage_path: String,
}

#[async_trait(?Send)]
pub trait ImageService {
	async fn generate(&self, prompt: &str, source_url: Option<&str>) -> Result<Vec<u8>, ImageError>;
	async fn upload(&self, bytes: Vec<u8>) -> Result<StoredImage, ImageError>;
}

/// Outcome of resolving every image prompt in a batch, keyed by the
/// proposed node's provisional id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedImages {
	pub images: HashMap<String, StoredImage>,
	pub failures: HashMap<String, ImageError>,
}

impl ResolvedImages {
	pub fn is_empty(&self) -> bool {
		self.images.is_empty() && self.failures.is_empty()
	}
}

async fn resolve_one(service: &dyn ImageService, node: &ProposedNode, prompt: &str) -> Result<StoredImage, ImageError> {
	let bytes = service.generate(prompt, node.source_image_url.as_deref()).await?;
	service.upload(bytes).await
}

/// Generates and uploads all images concurrently. One failure only affects
/// its own node.
pub async fn resolve_images(service: &dyn ImageService, nodes: &[ProposedNode]) -> ResolvedImages {
	let jobs = nodes.iter().filter_map(|node| {
		let prompt = node.image_prompt.as_deref()?;
		Some(async move { (node.id.clone(), resolve_one(service, node, prompt).await) })
	});

	let mut resolved = ResolvedImages::default();
	for (id, result) in join_all(jobs).await {
		match result {
			Ok(image) => {
				resolved.images.insert(id, image);
			}
			Err(err) => {
				warn!("image for proposed node {id} failed: {err}");
				resolved.failures.insert(id, err);
			}
		}
	}
	if !resolved.is_empty() {
		info!(
			"resolved {} image(s), {} failed",
			resolved.images.len(),
			resolved.failures.len()
		);
	}
	resolved
}
