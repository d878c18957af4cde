//! In-progress listing composition.
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assist::{AssistClient, AssistTask, GenerativeEndpoint};
use crate::model::{Category, ListingRecord, NewListing, Session};
use crate::store::{ListingWriter, WriteError};

pub const MAX_STAGED_IMAGES: usize = 10;

/// Used when a listing is submitted without any staged image.
pub const DEFAULT_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1517836357463-d25dfeac3438?auto=format&fit=crop&q=80&w=800";

/// Raw image picked by the user, not yet uploaded anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub file: ImageFile,
    pub preview_url: String,
}

impl StagedImage {
    fn stage(file: ImageFile) -> Self {
        let preview_url = format!("blob:sport-resell/{}", Uuid::new_v4());
        Self { file, preview_url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftState {
    pub title: String,
    pub description: String,
    /// Kept as entered; parsed on submit.
    pub price: String,
    pub category: Category,
    pub qa_note: String,
    pub images: Vec<StagedImage>,
}

impl Default for DraftState {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            price: String::new(),
            category: Category::Running,
            qa_note: String::new(),
            images: Vec::new(),
        }
    }
}

impl DraftState {
    fn parsed_price(&self) -> Option<u64> {
        self.price.trim().parse::<u64>().ok().filter(|p| *p > 0)
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Written; carries the record with its store-assigned id. Draft was reset.
    Posted(ListingRecord),
    /// Title or price missing. Nothing was sent.
    Incomplete,
    /// No authenticated session. Nothing was sent.
    Unauthenticated,
    /// The write path failed; the draft is left intact for another try.
    Rejected(WriteError),
}

#[derive(Debug, Default)]
pub struct DraftComposer {
    state: DraftState,
}

impl DraftComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DraftState {
        &self.state
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.state.title = title.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.state.description = description.into();
    }

    pub fn set_price(&mut self, price: impl Into<String>) {
        self.state.price = price.into();
    }

    pub fn set_category(&mut self, category: Category) {
        self.state.category = category;
    }

    pub fn set_qa_note(&mut self, note: impl Into<String>) {
        self.state.qa_note = note.into();
    }

    /// Stage images up to the cap. Excess files are dropped; returns how
    /// many were accepted.
    pub fn attach_images<I>(&mut self, files: I) -> usize
    where
        I: IntoIterator<Item = ImageFile>,
    {
        let room = MAX_STAGED_IMAGES.saturating_sub(self.state.images.len());
        let before = self.state.images.len();
        self.state
            .images
            .extend(files.into_iter().take(room).map(StagedImage::stage));
        let accepted = self.state.images.len() - before;
        debug!(accepted, staged = self.state.images.len(), "images attached");
        accepted
    }

    pub fn remove_image(&mut self, index: usize) -> Option<StagedImage> {
        (index < self.state.images.len()).then(|| self.state.images.remove(index))
    }

    pub fn reset(&mut self) {
        self.state = DraftState::default();
    }

    /// Fill the field `task` targets from the current title. No-op when the
    /// title is empty, a request is already in flight, or assist is
    /// unavailable. Returns true when the field changed.
    pub async fn assist<E: GenerativeEndpoint>(
        &mut self,
        client: &AssistClient<E>,
        task: AssistTask,
    ) -> bool {
        if self.state.title.trim().is_empty() || client.is_busy() {
            return false;
        }
        let Some(raw) = client.invoke(task, &self.state.title).await else {
            return false;
        };
        let field = match task {
            AssistTask::ImproveTitle => &mut self.state.title,
            AssistTask::GenerateDescription => &mut self.state.description,
            AssistTask::EstimatePrice => &mut self.state.price,
        };
        task.apply(&raw, field)
    }

    /// Build the record that would be written for `session`, if the draft
    /// is complete.
    pub fn to_new_listing(&self, session: &Session) -> Option<NewListing> {
        if self.state.title.trim().is_empty() {
            return None;
        }
        let price = self.state.parsed_price()?;
        let images = if self.state.images.is_empty() {
            vec![DEFAULT_IMAGE_URL.to_string()]
        } else {
            self.state
                .images
                .iter()
                .map(|img| img.preview_url.clone())
                .collect()
        };
        Some(NewListing {
            owner_id: session.user_id().to_string(),
            owner_handle: session.owner_handle(),
            title: self.state.title.clone(),
            category: self.state.category,
            price,
            images,
            description: self.state.description.clone(),
            created_at: Utc::now().timestamp_millis(),
            qa_note: self.state.qa_note.clone(),
        })
    }

    #[instrument(skip_all)]
    pub async fn submit(
        &mut self,
        session: Option<&Session>,
        writer: &dyn ListingWriter,
    ) -> SubmitOutcome {
        let Some(session) = session else {
            debug!("submit ignored: not authenticated");
            return SubmitOutcome::Unauthenticated;
        };
        let Some(listing) = self.to_new_listing(session) else {
            debug!("submit ignored: title or price missing");
            return SubmitOutcome::Incomplete;
        };

        match writer.add_listing(&listing).await {
            Ok(id) => {
                info!(%id, title = %listing.title, "listing submitted");
                self.reset();
                SubmitOutcome::Posted(listing.into_record(id))
            }
            Err(err) => {
                warn!(%err, "listing submission failed; draft kept");
                SubmitOutcome::Rejected(err)
            }
        }
    }
}
