use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct EventRecord {
  pub id:       String,
  #[serde(default)]
  pub name:     String,
  pub task_id:  String,
  #[serde(default)]
  pub due_date: Option<String>,
  #[serde(default)]
  pub assignee: Option<String>,
  #[serde(default)]
  pub status:   String,
  #[serde(default)]
  pub note:     Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskRecord {
  pub id:            String,
  #[serde(default)]
  pub name:          String,
  #[serde(default)]
  pub category:      String,
  #[serde(default)]
  pub sub_category:  String,
  #[serde(default)]
  pub start_date:    Option<String>,
  #[serde(default)]
  pub end_date:      Option<String>,
  #[serde(default)]
  pub assignee:      Option<String>,
  #[serde(default)]
  pub status:        String,
  #[serde(default)]
  pub display_order: i64,
  #[serde(default)]
  pub note:          Option<String>,
  #[serde(default)]
  pub events:        Vec<EventRecord>
}

/// Batch body accepted by the bulk-save
/// endpoint.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
  pub categories:             Vec<String>,
  pub subcategories:
    BTreeMap<String, Vec<String>>,
  pub tasks:
    BTreeMap<String, Vec<String>>,
  pub expanded_categories:    Vec<String>,
  pub expanded_subcategories: Vec<String>
}

impl SyncPayload {
  /// Flattened position of every task id
  /// in category, subcategory, task order.
  /// The backing store adopts these as the
  /// new `display_order` values.
  pub fn display_orders(
    &self
  ) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    let mut next = 0i64;

    let mut visit = |key: String| {
      if let Some(ids) = self.tasks.get(&key)
      {
        for id in ids {
          if !out.contains_key(id) {
            out.insert(id.clone(), next);
            next += 1;
          }
        }
      }
    };

    for category in &self.categories {
      if let Some(subs) =
        self.subcategories.get(category)
      {
        for sub in subs {
          visit(format!("{category}::{sub}"));
        }
      }
    }

    // buckets not reachable through the
    // category/subcategory order still keep
    // a position, after everything else
    for key in self.tasks.keys() {
      visit(key.clone());
    }

    out
  }
}
