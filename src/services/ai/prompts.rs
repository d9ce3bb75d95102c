//! Prompt templates for the AI-assisted steps.
//!
//! Every prompt demands a terse, machine-parseable answer so the callers'
//! parse helpers (`parse_quality_response`, `parse_id_list`) can accept or
//! reject the response deterministically.

/// Ask for a cleaned media title derived from a release-style filename.
///
/// The response is used verbatim as the destination file stem, so the
/// prompt forbids extensions and path separators.
pub fn clean_filename_prompt(filename: &str) -> String {
    format!(
        "Clean this media filename into a human-readable title. \
         Remove release tags, resolution markers, codec names, and group names. \
         Keep the year if present. \
         Respond with the title only, no file extension, no path separators, no quotes.\n\
         Filename: {}",
        filename
    )
}

/// Ask for a constant-quality level recommendation from probe metadata.
pub fn recommend_quality_prompt(probe_document: &str) -> String {
    format!(
        "Given this media metadata document, recommend a constant-quality \
         level for an HEVC re-encode that preserves visual quality while \
         reducing size. Respond with a single integer between 10 and 51, \
         nothing else.\n\nMetadata:\n{}",
        probe_document
    )
}

/// Ask for a transcription of an extracted audio track, as SRT.
pub fn transcribe_prompt(audio_description: &str) -> String {
    format!(
        "Transcribe the dialogue of this audio track into SubRip (SRT) \
         format with sequential cue numbers and HH:MM:SS,mmm timestamps. \
         Respond with the SRT content only.\n\nAudio: {}",
        audio_description
    )
}

/// Ask to rank processed-library entries against a free-text query.
///
/// `entries` is rendered one per line as `id<TAB>path`.
pub fn rank_library_prompt(query: &str, entries: &str) -> String {
    format!(
        "Given this list of processed media files (one per line, \
         `id<TAB>path`), return the ids of the entries most relevant to the \
         query, best match first. Respond with a JSON array of id strings, \
         nothing else.\n\nQuery: {}\n\nFiles:\n{}",
        query, entries
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_carry_inputs() {
        assert!(clean_filename_prompt("Movie.2020.1080p.x265-GRP.mkv").contains("Movie.2020"));
        assert!(recommend_quality_prompt("{\"format\":{}}").contains("between 10 and 51"));
        assert!(rank_library_prompt("westerns", "a\t/m/a.mkv").contains("westerns"));
        assert!(transcribe_prompt("track 0").contains("SubRip"));
    }
}
