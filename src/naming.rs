//! Listing titles, folder names and where listing folders live in the drive.

use crate::models::ListingDraft;

/// Suffix that marks a folder as created by this service.
pub const FOLDER_MARKER: &str = " #SADEEVIM";

/// Room layout whose folders sit directly under the root folder.
pub const ROOT_LEVEL_ROOM_LABEL: &str = "3+1";

/// Subfolder used when the extracted text carried no room count.
pub const UNKNOWN_ROOM_FOLDER: &str = "Belirsiz";

/// `"{neighborhood}-{street}-{room_count}"` with punctuation and symbols
/// removed from the neighborhood and street.
pub fn derive_title(neighborhood: &str, street: &str, room_count: &str) -> String {
    format!(
        "{}-{}-{}",
        keep_words(neighborhood),
        keep_words(street),
        room_count.trim()
    )
}

pub fn draft_title(draft: &ListingDraft) -> String {
    derive_title(
        draft.neighborhood.as_deref().unwrap_or_default(),
        draft.street.as_deref().unwrap_or_default(),
        draft.room_count.as_deref().unwrap_or_default(),
    )
}

pub fn folder_name(draft: &ListingDraft) -> String {
    format!("{}{}", draft_title(draft), FOLDER_MARKER)
}

fn keep_words(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Drops every whitespace character, so `" 3 + 1 "` becomes `"3+1"`.
pub fn normalize_room_label(raw: &str) -> String {
    raw.split_whitespace().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderPlacement {
    Root,
    RoomSubfolder(String),
}

pub fn placement(room_count: Option<&str>) -> FolderPlacement {
    let label = room_count.map(normalize_room_label).unwrap_or_default();
    if label.is_empty() {
        FolderPlacement::RoomSubfolder(UNKNOWN_ROOM_FOLDER.to_string())
    } else if label.eq_ignore_ascii_case(ROOT_LEVEL_ROOM_LABEL) {
        FolderPlacement::Root
    } else {
        FolderPlacement::RoomSubfolder(label)
    }
}

/// Part of a folder name expected to appear in the matching listing title:
/// the marker and any trailing ` #tag` are cut off.
pub fn title_fragment(folder_name: &str) -> &str {
    let without_marker = folder_name
        .strip_suffix(FOLDER_MARKER)
        .unwrap_or(folder_name);
    without_marker
        .split(" #")
        .next()
        .unwrap_or_default()
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_punctuation_but_keeps_spaces() {
        let title = derive_title("Moda", "Bahçe Sk.", "2+1");
        assert_eq!(title, "Moda-Bahçe Sk-2+1");
        assert_eq!(derive_title("Moda", "Bahçe Sk.", "2+1"), title);
    }

    #[test]
    fn title_keeps_turkish_letters_and_digits() {
        assert_eq!(
            derive_title("🏠 Kadıköy/Moda", "Şair Nefi Sk. No:12", "1+1"),
            "KadıköyModa-Şair Nefi Sk No12-1+1"
        );
    }

    #[test]
    fn folder_name_carries_marker() {
        let draft = ListingDraft {
            neighborhood: Some("Moda".into()),
            street: Some("Bahçe Sk.".into()),
            room_count: Some("2+1".into()),
            ..ListingDraft::default()
        };
        assert_eq!(folder_name(&draft), "Moda-Bahçe Sk-2+1 #SADEEVIM");
    }

    #[test]
    fn three_plus_one_goes_to_root_regardless_of_spacing() {
        assert_eq!(placement(Some("3+1")), FolderPlacement::Root);
        assert_eq!(placement(Some(" 3 + 1 ")), FolderPlacement::Root);
        assert_eq!(
            placement(Some("2 + 1")),
            FolderPlacement::RoomSubfolder("2+1".into())
        );
        assert_eq!(
            placement(None),
            FolderPlacement::RoomSubfolder(UNKNOWN_ROOM_FOLDER.into())
        );
    }

    #[test]
    fn fragment_drops_marker_and_trailing_tags() {
        assert_eq!(title_fragment("Moda-Bahçe Sk-2+1 #SADEEVIM"), "Moda-Bahçe Sk-2+1");
        assert_eq!(title_fragment("Moda-Bahçe Sk-2+1 #eski"), "Moda-Bahçe Sk-2+1");
        assert_eq!(title_fragment("Moda-Bahçe Sk-2+1"), "Moda-Bahçe Sk-2+1");
    }
}
