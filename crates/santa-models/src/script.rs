//! Generated scripts and the bounded scene list.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult};

/// Upper bound on scenes in one video.
pub const MAX_SCENES: usize = 8;

/// One narrative segment of the final video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// 1-based position in the final video
    pub scene_number: u32,

    /// Short scene title
    pub title: String,

    /// What Santa says during the scene
    pub narration: String,

    /// Prompt for the keyframe image
    pub image_prompt: String,

    /// Camera and motion direction for the scene video
    pub motion_prompt: String,
}

/// Ordered, non-empty list of at most [`MAX_SCENES`] scenes numbered 1..=n.
///
/// Construction sorts by scene number and rejects gaps or duplicates, so
/// iteration order is always the final playback order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "Vec<Scene>", into = "Vec<Scene>")]
pub struct SceneList(Vec<Scene>);

impl SceneList {
    pub fn new(mut scenes: Vec<Scene>) -> ModelResult<Self> {
        if scenes.is_empty() {
            return Err(ModelError::validation("script has no scenes"));
        }
        if scenes.len() > MAX_SCENES {
            return Err(ModelError::validation(format!(
                "script has {} scenes, maximum is {}",
                scenes.len(),
                MAX_SCENES
            )));
        }

        scenes.sort_by_key(|s| s.scene_number);
        for (i, scene) in scenes.iter().enumerate() {
            let expected = i as u32 + 1;
            if scene.scene_number != expected {
                return Err(ModelError::validation(format!(
                    "scene numbers must run 1..={} without gaps, found {} at position {}",
                    scenes.len(),
                    scene.scene_number,
                    expected
                )));
            }
        }

        Ok(Self(scenes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed list.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.0.iter()
    }

    pub fn get(&self, scene_number: u32) -> Option<&Scene> {
        scene_number
            .checked_sub(1)
            .and_then(|idx| self.0.get(idx as usize))
    }

    pub fn scene_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|s| s.scene_number)
    }
}

impl TryFrom<Vec<Scene>> for SceneList {
    type Error = ModelError;

    fn try_from(scenes: Vec<Scene>) -> Result<Self, Self::Error> {
        Self::new(scenes)
    }
}

impl From<SceneList> for Vec<Scene> {
    fn from(list: SceneList) -> Self {
        list.0
    }
}

impl<'a> IntoIterator for &'a SceneList {
    type Item = &'a Scene;
    type IntoIter = std::slice::Iter<'a, Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Script recorded on the order once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub title: String,
    pub scenes: SceneList,
}

impl Script {
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(n: u32) -> Scene {
        Scene {
            scene_number: n,
            title: format!("Scene {}", n),
            narration: "Ho ho ho".into(),
            image_prompt: "Santa in his workshop".into(),
            motion_prompt: "slow push in".into(),
        }
    }

    #[test]
    fn test_scene_list_sorts() {
        let list = SceneList::new(vec![scene(2), scene(3), scene(1)]).unwrap();
        assert_eq!(list.scene_numbers().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(list.get(2).unwrap().title, "Scene 2");
        assert!(list.get(0).is_none());
        assert!(list.get(4).is_none());
    }

    #[test]
    fn test_scene_list_rejects_bad_shapes() {
        assert!(SceneList::new(vec![]).is_err());
        assert!(SceneList::new(vec![scene(1), scene(3)]).is_err());
        assert!(SceneList::new(vec![scene(1), scene(1)]).is_err());

        let too_many: Vec<_> = (1..=MAX_SCENES as u32 + 1).map(scene).collect();
        assert!(SceneList::new(too_many).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = serde_json::json!({
            "title": "t",
            "scenes": [serde_json::to_value(scene(2)).unwrap()]
        });
        assert!(serde_json::from_value::<Script>(bad).is_err());

        let good = serde_json::json!({
            "title": "t",
            "scenes": [
                serde_json::to_value(scene(2)).unwrap(),
                serde_json::to_value(scene(1)).unwrap()
            ]
        });
        let script: Script = serde_json::from_value(good).unwrap();
        assert_eq!(script.scene_count(), 2);
    }
}
