//! Stage instruction templates.
//!
//! Composition is pure and deterministic: the same stage, clutter list, redo
//! flag, scenario and props always produce the same text.

use roomstage_contracts::stages::Stage;

use crate::clutter::CLUTTER_LABEL;

/// Provider-facing prompt pair for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub text: String,
    pub negative: String,
}

const PRESERVE_ROOM: &str = "Keep the room structure, walls, windows, floor, furniture positions, \
lighting and camera angle exactly as they are.";

const NEGATIVE_BASE: &str = "clutter, trash, garbage, mess, scattered objects, dirty surfaces, \
stains, blurry, distorted furniture, changed room structure, extra doors or windows, \
low quality, watermark text";

const SCENARIO_FALLBACK: &str = "the requested scenario";

pub fn compose(
    stage: Stage,
    clutter_list: &str,
    is_redo: bool,
    scenario: Option<&str>,
    props: Option<&str>,
) -> Instruction {
    let clutter = clutter_list.trim();
    let text = match stage {
        Stage::SceneAnalysis => scene_analysis(is_redo),
        Stage::BasicCleanup => basic_cleanup(clutter, is_redo),
        Stage::DeepCleanup => deep_cleanup(clutter, is_redo),
        Stage::LayoutOptimize => layout_optimize(clutter, is_redo),
        Stage::AddProps => add_props(clutter, is_redo, scenario, props),
    };
    Instruction {
        text,
        negative: negative_instruction(clutter),
    }
}

/// Shared negative prompt; the clutter list is appended so removed items are
/// not painted back in.
pub fn negative_instruction(clutter_list: &str) -> String {
    let clutter = clutter_list.trim();
    if clutter.is_empty() {
        return NEGATIVE_BASE.to_string();
    }
    format!("{NEGATIVE_BASE}, {clutter}")
}

fn scene_analysis(is_redo: bool) -> String {
    let mut text = String::new();
    if is_redo {
        text.push_str(
            "Look at the photo again more carefully; the previous analysis missed items. \
Include small objects such as cables, wrappers, bottles, cups and clothing.\n",
        );
    }
    text.push_str(
        "You are a professional home organizer. Study this room photo and answer in the \
following labeled sections:\n",
    );
    text.push_str("【场景概述】 room type, approximate size, lighting and overall style.\n");
    text.push_str(&format!(
        "{CLUTTER_LABEL} a comma-separated list of every piece of trash, clutter or \
out-of-place item you can see, most visible first.\n"
    ));
    text.push_str(
        "【整理建议】 concrete steps to tidy the room without moving furniture or \
changing the structure of the room.",
    );
    text
}

fn removal_context(clutter: &str) -> String {
    if clutter.is_empty() {
        return String::new();
    }
    format!(" Items identified in this room that must be removed: {clutter}.")
}

fn keep_out_context(clutter: &str) -> String {
    if clutter.is_empty() {
        return String::new();
    }
    format!(" Do not put back any of these removed items: {clutter}.")
}

fn basic_cleanup(clutter: &str, is_redo: bool) -> String {
    let lead = if is_redo {
        "The previous cleanup was not thorough enough. Edit this room photo again and remove \
the remaining trash and clutter far more aggressively: every loose item on the floor, bed, \
desk, tables and shelves that is not furniture must disappear."
    } else {
        "Edit this room photo: remove all obvious trash and loose clutter from the floor, \
tables and other surfaces."
    };
    format!("{lead}{} {PRESERVE_ROOM}", removal_context(clutter))
}

fn deep_cleanup(clutter: &str, is_redo: bool) -> String {
    let lead = if is_redo {
        "Deep cleaning is still incomplete. Edit this room photo again and go much further: \
erase every remaining sticker, stain, mark, cable and small leftover object, and make every \
surface look spotless and freshly wiped."
    } else {
        "Edit this room photo for a deep clean: remove stickers, stains, marks, tangled cables \
and small leftover objects, and straighten bedding, cushions and curtains."
    };
    format!("{lead}{} {PRESERVE_ROOM}", removal_context(clutter))
}

fn layout_optimize(clutter: &str, is_redo: bool) -> String {
    let lead = if is_redo {
        "Edit this room photo with a different arrangement than the previous attempt: \
regroup the remaining items and accessories so the space feels more open and balanced."
    } else {
        "Edit this room photo to optimize the layout: neatly arrange the remaining items, \
align accessories and make the space feel open and orderly without adding new objects."
    };
    format!(
        "{lead}{} Keep walls, windows, floor and the camera angle unchanged.",
        keep_out_context(clutter)
    )
}

fn add_props(clutter: &str, is_redo: bool, scenario: Option<&str>, props: Option<&str>) -> String {
    let scenario = scenario
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(SCENARIO_FALLBACK);
    let props_clause = props
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| format!(", including {value}"))
        .unwrap_or_default();
    let mut text = format!(
        "Edit this room photo so it is ready for {scenario}: add tasteful, realistic props \
that suit the scenario{props_clause}, matching the room's lighting, scale and perspective."
    );
    if is_redo {
        text.push_str(
            " Choose a different set of props and a different placement than the previous attempt.",
        );
    }
    text.push_str(&keep_out_context(clutter));
    text.push_str(" Keep the cleaned room, walls, windows and furniture unchanged.");
    text
}

#[cfg(test)]
mod tests {
    use roomstage_contracts::stages::ALL_STAGES;

    use super::*;

    #[test]
    fn redo_changes_every_image_stage_instruction() {
        for stage in ALL_STAGES.into_iter().filter(|stage| stage.produces_image()) {
            for clutter in ["", "bottles, cups"] {
                let first = compose(stage, clutter, false, Some("a birthday party"), None);
                let redo = compose(stage, clutter, true, Some("a birthday party"), None);
                assert_ne!(first.text, redo.text, "{stage} with clutter {clutter:?}");
            }
        }
    }

    #[test]
    fn clutter_items_are_named_in_later_stages() {
        for stage in [Stage::BasicCleanup, Stage::DeepCleanup, Stage::LayoutOptimize, Stage::AddProps] {
            let instruction = compose(stage, "bottles, cups", false, Some("a reading nook"), None);
            assert!(instruction.text.contains("bottles, cups"), "{stage}");
            assert!(instruction.negative.ends_with(", bottles, cups"));
        }
    }

    #[test]
    fn empty_clutter_list_only_reduces_specificity() {
        let instruction = compose(Stage::BasicCleanup, "   ", false, None, None);
        assert!(!instruction.text.contains("must be removed"));
        assert_eq!(instruction.negative, NEGATIVE_BASE);
    }

    #[test]
    fn composition_is_deterministic() {
        let a = compose(Stage::AddProps, "cups", true, Some("a tea party"), Some("teapot"));
        let b = compose(Stage::AddProps, "cups", true, Some("a tea party"), Some("teapot"));
        assert_eq!(a, b);
    }

    #[test]
    fn props_stage_interpolates_scenario_and_optional_props() {
        let with_props = compose(Stage::AddProps, "", false, Some("a tea party"), Some("teapot, scones"));
        assert!(with_props.text.contains("ready for a tea party"));
        assert!(with_props.text.contains("including teapot, scones"));

        let without_props = compose(Stage::AddProps, "", false, Some("a tea party"), Some("  "));
        assert!(!without_props.text.contains("including"));
    }

    #[test]
    fn scene_analysis_requests_the_clutter_section() {
        let instruction = compose(Stage::SceneAnalysis, "", false, None, None);
        assert!(instruction.text.contains(CLUTTER_LABEL));
        let redo = compose(Stage::SceneAnalysis, "", true, None, None);
        assert_ne!(instruction.text, redo.text);
    }
}
