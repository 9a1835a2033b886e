use crate::models::{Chapter, ChapterDraft, Story, StoryDraft};
use crate::services::image::{Illustration, Illustrator};
use std::time::Duration;
use tracing::instrument;

const CONTENT_PROMPT_CHARS: usize = 200;

/// Scene description for a chapter: the action prompt, then the legacy
/// prompt field, then the opening of the chapter text.
pub fn scene_prompt(chapter: &ChapterDraft) -> String {
    [&chapter.image_action_prompt, &chapter.image_prompt]
        .into_iter()
        .flatten()
        .map(|p| p.trim())
        .find(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let opening: String = chapter.content.chars().take(CONTENT_PROMPT_CHARS).collect();
            format!("illustration of: {}", opening.trim())
        })
}

/// Illustrates every chapter in narrative order and merges the results.
///
/// One image request per chapter, strictly sequential, with `pacing`
/// between consecutive requests. A chapter whose illustration is
/// unavailable gets `placeholder_url` and the loop carries on.
#[instrument(skip_all, fields(title = %draft.title, chapters = draft.chapters.len()))]
pub async fn assemble_story(
    draft: StoryDraft,
    illustrator: &dyn Illustrator,
    pacing: Duration,
    placeholder_url: &str,
) -> Story {
    let character = draft
        .main_character_visual
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut chapters = Vec::with_capacity(draft.chapters.len());
    let mut unavailable = 0usize;

    for (index, chapter) in draft.chapters.into_iter().enumerate() {
        if index > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let image_prompt = scene_prompt(&chapter);
        let illustration = illustrator.illustrate(&image_prompt, character).await;
        if illustration == Illustration::Unavailable {
            unavailable += 1;
            tracing::warn!(chapter = index + 1, "chapter left with placeholder image");
        }

        chapters.push(Chapter {
            title: chapter.title,
            content: chapter.content,
            image_prompt,
            image: Some(illustration.to_image_ref(placeholder_url)),
        });
    }

    tracing::info!(unavailable, "story assembled");

    Story {
        title: draft.title,
        moral: draft.moral,
        main_character_visual: draft.main_character_visual,
        chapters,
    }
}
