//! The garbage-collected heap: a string pool, an object pool, and the
//! mark-and-sweep collector over both.
//!
//! Both pools are slot-recycled arrays. An index handed out for a live item
//! never moves; sweep flips the slot dead and pushes its index onto the
//! pool's free-list for reuse by a later allocation. A reused slot is a new
//! item: any reference to the old index was unreachable by definition once
//! sweep freed it.

use beef::lean::Cow;

use crate::value::Value;

struct HeapString {
  data: Cow<'static, str>,
  marked: bool,
  alive: bool,
}

struct HeapObject {
  fields: Vec<Value>,
  marked: bool,
  alive: bool,
}

#[derive(Default)]
pub(crate) struct Heap {
  strings: Vec<HeapString>,
  string_free: Vec<usize>,
  live_strings: usize,
  objects: Vec<HeapObject>,
  object_free: Vec<usize>,
}

impl Heap {
  pub fn alloc_string(&mut self, data: Cow<'static, str>) -> usize {
    self.live_strings += 1;
    let slot = HeapString {
      data,
      marked: false,
      alive: true,
    };
    match self.string_free.pop() {
      Some(index) => {
        self.strings[index] = slot;
        index
      }
      None => {
        self.strings.push(slot);
        self.strings.len() - 1
      }
    }
  }

  pub fn string(&self, index: usize) -> Option<&str> {
    match self.strings.get(index) {
      Some(slot) if slot.alive => Some(slot.data.as_ref()),
      _ => None,
    }
  }

  /// Strings allocated and not yet swept. Drives the collection trigger.
  pub fn live_strings(&self) -> usize {
    self.live_strings
  }

  pub fn alloc_object(&mut self, field_count: usize) -> usize {
    let slot = HeapObject {
      fields: vec![Value::None; field_count],
      marked: false,
      alive: true,
    };
    match self.object_free.pop() {
      Some(index) => {
        self.objects[index] = slot;
        index
      }
      None => {
        self.objects.push(slot);
        self.objects.len() - 1
      }
    }
  }

  pub fn object_is_live(&self, index: usize) -> bool {
    matches!(self.objects.get(index), Some(slot) if slot.alive)
  }

  /// Field count of a live object; `None` for dead or out-of-range slots.
  pub fn object_field_count(&self, index: usize) -> Option<usize> {
    match self.objects.get(index) {
      Some(slot) if slot.alive => Some(slot.fields.len()),
      _ => None,
    }
  }

  /// Reads through dead or out-of-range slots yield `Value::None`.
  pub fn object_field(&self, index: usize, field: usize) -> Value {
    match self.objects.get(index) {
      Some(slot) if slot.alive => slot.fields.get(field).copied().unwrap_or_default(),
      _ => Value::None,
    }
  }

  /// Writes to dead or out-of-range slots are dropped.
  pub fn set_object_field(&mut self, index: usize, field: usize, value: Value) {
    if let Some(slot) = self.objects.get_mut(index) {
      if slot.alive {
        if let Some(f) = slot.fields.get_mut(field) {
          *f = value;
        }
      }
    }
  }

  /// One full mark-and-sweep cycle.
  ///
  /// `roots` is every value the caller can still reach directly: the whole
  /// register file plus each live frame's saved registers. Reachability
  /// propagates from marked objects through their fields to a fixed point;
  /// everything unmarked afterwards is freed.
  pub fn collect(&mut self, roots: impl Iterator<Item = Value>) {
    let mut gray = Vec::new();
    for value in roots {
      self.mark_value(value, &mut gray);
    }
    while let Some(index) = gray.pop() {
      for field in 0..self.objects[index].fields.len() {
        let value = self.objects[index].fields[field];
        self.mark_value(value, &mut gray);
      }
    }
    self.sweep();
  }

  fn mark_value(&mut self, value: Value, gray: &mut Vec<usize>) {
    match value {
      Value::Str(index) => {
        if let Some(slot) = self.strings.get_mut(index) {
          if slot.alive {
            slot.marked = true;
          }
        }
      }
      Value::Object(index) => {
        if let Some(slot) = self.objects.get_mut(index) {
          if slot.alive && !slot.marked {
            slot.marked = true;
            gray.push(index);
          }
        }
      }
      _ => {}
    }
  }

  fn sweep(&mut self) {
    let mut swept_strings = 0;
    for (index, slot) in self.strings.iter_mut().enumerate() {
      if !slot.alive {
        continue;
      }
      if slot.marked {
        slot.marked = false;
      } else {
        slot.data = Cow::borrowed("");
        slot.alive = false;
        self.string_free.push(index);
        swept_strings += 1;
      }
    }
    self.live_strings -= swept_strings;

    let mut swept_objects = 0;
    for (index, slot) in self.objects.iter_mut().enumerate() {
      if !slot.alive {
        continue;
      }
      if slot.marked {
        slot.marked = false;
      } else {
        slot.fields = Vec::new();
        slot.alive = false;
        self.object_free.push(index);
        swept_objects += 1;
      }
    }

    tracing::debug!(
      swept_strings,
      swept_objects,
      live_strings = self.live_strings,
      "gc cycle"
    );
  }
}

#[cfg(test)]
mod tests;
