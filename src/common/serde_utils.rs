use serde::{Deserialize, Deserializer};

/// Distingue "campo ausente" (`None`) de "campo = null" (`Some(None)`)
/// nos payloads de atualização parcial.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        parent_id: Option<Option<Uuid>>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.parent_id, None);

        let null: Patch = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(null.parent_id, Some(None));

        let id = Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"parent_id": "{}"}}"#, id)).unwrap();
        assert_eq!(set.parent_id, Some(Some(id)));
    }
}
