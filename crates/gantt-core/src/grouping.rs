use std::collections::HashMap;

use crate::ordering::OrderSnapshot;
use crate::task::{
  GroupKey,
  Task,
  TaskId
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcategoryGroup<'a> {
  pub key:   GroupKey,
  pub tasks: Vec<&'a Task>
}

impl SubcategoryGroup<'_> {
  pub fn name(&self) -> &str {
    &self.key.sub_category
  }

  pub fn position_of(
    &self,
    id: &TaskId
  ) -> Option<usize> {
    self
      .tasks
      .iter()
      .position(|task| task.id == *id)
  }

  pub fn task_ids(&self) -> Vec<TaskId> {
    self
      .tasks
      .iter()
      .map(|task| task.id.clone())
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup<'a> {
  pub name:          String,
  pub subcategories: Vec<SubcategoryGroup<'a>>
}

impl<'a> CategoryGroup<'a> {
  pub fn tasks(
    &self
  ) -> impl Iterator<Item = &'a Task> + '_ {
    self.subcategories.iter().flat_map(
      |sub| sub.tasks.iter().copied()
    )
  }
}

pub fn find_subcategory_mut<'v, 'a>(
  groups: &'v mut [CategoryGroup<'a>],
  key: &GroupKey
) -> Option<&'v mut SubcategoryGroup<'a>> {
  groups
    .iter_mut()
    .filter(|group| {
      group.name == key.category
    })
    .flat_map(|group| {
      group.subcategories.iter_mut()
    })
    .find(|sub| sub.key == *key)
}

/// Nests the flat task list as
/// category → subcategory → tasks, ordered
/// by the stored preferences. Anything the
/// stored order does not mention keeps its
/// encounter order after the known entries.
pub fn resolve<'a>(
  tasks: &'a [Task],
  order: &OrderSnapshot
) -> Vec<CategoryGroup<'a>> {
  let mut categories: Vec<(
    String,
    Vec<(String, Vec<&'a Task>)>
  )> = Vec::new();

  for task in tasks {
    let cat_idx = match categories
      .iter()
      .position(|(name, _)| {
        *name == task.category
      }) {
      | Some(idx) => idx,
      | None => {
        categories.push((
          task.category.clone(),
          Vec::new()
        ));
        categories.len() - 1
      }
    };

    let subs = &mut categories[cat_idx].1;
    match subs.iter_mut().find(
      |(name, _)| {
        *name == task.sub_category
      }
    ) {
      | Some((_, bucket)) => {
        bucket.push(task)
      }
      | None => {
        subs.push((
          task.sub_category.clone(),
          vec![task]
        ))
      }
    }
  }

  sort_by_stored_position(
    &mut categories,
    &order.categories,
    |(name, _)| name.as_str()
  );

  categories
    .into_iter()
    .map(|(category, mut subs)| {
      let stored_subs = order
        .subcategories
        .get(&category)
        .map(Vec::as_slice)
        .unwrap_or_default();
      sort_by_stored_position(
        &mut subs,
        stored_subs,
        |(name, _)| name.as_str()
      );

      let subcategories = subs
        .into_iter()
        .map(|(sub, bucket)| {
          let key = GroupKey::new(
            category.clone(),
            sub
          );
          let tasks = order_bucket(
            bucket,
            order
              .tasks
              .get(&key.storage_key())
              .map(Vec::as_slice)
              .unwrap_or_default()
          );
          SubcategoryGroup { key, tasks }
        })
        .collect();

      CategoryGroup {
        name: category,
        subcategories
      }
    })
    .collect()
}

fn order_bucket<'a>(
  mut bucket: Vec<&'a Task>,
  stored: &[TaskId]
) -> Vec<&'a Task> {
  let mut position: HashMap<
    &TaskId,
    usize
  > = HashMap::new();
  for (idx, id) in
    stored.iter().enumerate()
  {
    position.entry(id).or_insert(idx);
  }

  bucket.sort_by_key(|task| {
    position
      .get(&task.id)
      .copied()
      .unwrap_or(usize::MAX)
  });
  bucket
}

fn sort_by_stored_position<T, F>(
  items: &mut [T],
  stored: &[String],
  name_of: F
) where
  F: Fn(&T) -> &str
{
  // sort_by_key is stable, so unknown
  // names keep their input order
  items.sort_by_key(|item| {
    let name = name_of(item);
    stored
      .iter()
      .position(|known| known == name)
      .unwrap_or(usize::MAX)
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::TaskId;

  fn task(
    id: &str,
    category: &str,
    sub: &str
  ) -> Task {
    Task::new(
      TaskId::from(id),
      id,
      category,
      sub,
      0
    )
  }

  fn names(
    groups: &[CategoryGroup<'_>]
  ) -> Vec<String> {
    groups
      .iter()
      .map(|g| g.name.clone())
      .collect()
  }

  #[test]
  fn empty_order_keeps_encounter_order() {
    let tasks = vec![
      task("a", "Ops", "CI"),
      task("b", "Dev", "BE"),
      task("c", "Ops", "Infra"),
      task("d", "Ops", "CI"),
    ];
    let groups = resolve(
      &tasks,
      &OrderSnapshot::default()
    );

    assert_eq!(names(&groups), [
      "Ops", "Dev"
    ]);
    assert_eq!(
      groups[0].subcategories[0]
        .task_ids(),
      vec![
        TaskId::from("a"),
        TaskId::from("d")
      ]
    );
    assert_eq!(
      groups[0].subcategories[1].name(),
      "Infra"
    );
  }

  #[test]
  fn stored_order_wins_and_unknowns_trail()
  {
    let tasks = vec![
      task("a", "Dev", "BE"),
      task("new", "Dev", "BE"),
      task("b", "Dev", "BE"),
      task("x", "Ops", "CI"),
      task("y", "QA", "Manual"),
      task("z", "Dev", "FE"),
    ];
    let mut order = OrderSnapshot {
      categories: vec![
        "QA".to_string(),
        "Dev".to_string(),
      ],
      ..OrderSnapshot::default()
    };
    order.subcategories.insert(
      "Dev".to_string(),
      vec![
        "FE".to_string(),
        "BE".to_string(),
      ]
    );
    order.tasks.insert(
      "Dev::BE".to_string(),
      vec![
        TaskId::from("b"),
        TaskId::from("gone"),
        TaskId::from("a"),
      ]
    );

    let groups = resolve(&tasks, &order);
    assert_eq!(names(&groups), [
      "QA", "Dev", "Ops"
    ]);

    let dev = &groups[1];
    assert_eq!(
      dev.subcategories[0].name(),
      "FE"
    );
    assert_eq!(
      dev.subcategories[1].task_ids(),
      vec![
        TaskId::from("b"),
        TaskId::from("a"),
        TaskId::from("new")
      ]
    );
  }

  #[test]
  fn resolve_is_pure() {
    let tasks = vec![
      task("a", "Dev", "BE"),
      task("b", "Ops", "CI"),
      task("c", "Dev", "BE"),
    ];
    let mut order =
      OrderSnapshot::default();
    order.tasks.insert(
      "Dev::BE".to_string(),
      vec![TaskId::from("c")]
    );

    assert_eq!(
      resolve(&tasks, &order),
      resolve(&tasks, &order)
    );
  }

  #[test]
  fn finds_subcategory_for_mutation() {
    let tasks = vec![
      task("a", "Dev", "BE"),
      task("b", "Dev", "BE"),
    ];
    let mut groups = resolve(
      &tasks,
      &OrderSnapshot::default()
    );
    let key = GroupKey::new("Dev", "BE");
    let sub =
      find_subcategory_mut(&mut groups, &key)
        .expect("bucket exists");
    sub.tasks.reverse();

    assert_eq!(
      groups[0].subcategories[0]
        .position_of(&TaskId::from("a")),
      Some(1)
    );
    assert_eq!(groups[0].tasks().count(), 2);
  }
}
