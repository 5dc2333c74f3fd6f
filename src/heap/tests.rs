use beef::lean::Cow;

use super::Heap;
use crate::value::Value;

fn string(heap: &mut Heap, data: &'static str) -> usize {
  heap.alloc_string(Cow::borrowed(data))
}

#[test]
fn string_indices_survive_collection() {
  let mut heap = Heap::default();
  let a = string(&mut heap, "a");
  let b = string(&mut heap, "b");
  let c = string(&mut heap, "c");
  assert_eq!(heap.live_strings(), 3);

  heap.collect([Value::Str(a), Value::Str(c)].into_iter());

  assert_eq!(heap.string(a), Some("a"));
  assert_eq!(heap.string(b), None);
  assert_eq!(heap.string(c), Some("c"));
  assert_eq!(heap.live_strings(), 2);
}

#[test]
fn swept_string_slots_are_reused() {
  let mut heap = Heap::default();
  let a = string(&mut heap, "a");
  let b = string(&mut heap, "b");
  heap.collect([Value::Str(a)].into_iter());

  // the freed slot is handed out again; the survivor does not move
  let d = string(&mut heap, "d");
  assert_eq!(d, b);
  assert_eq!(heap.string(a), Some("a"));
  assert_eq!(heap.string(d), Some("d"));
}

#[test]
fn object_fields_default_to_none() {
  let mut heap = Heap::default();
  let object = heap.alloc_object(3);
  assert!(heap.object_is_live(object));
  assert_eq!(heap.object_field_count(object), Some(3));
  assert_eq!(heap.object_field(object, 0), Value::None);
  assert_eq!(heap.object_field(object, 2), Value::None);
}

#[test]
fn out_of_range_object_accesses_are_inert() {
  let mut heap = Heap::default();
  let object = heap.alloc_object(1);
  heap.set_object_field(object, 5, Value::Int(1));
  heap.set_object_field(object + 1, 0, Value::Int(1));
  assert_eq!(heap.object_field(object, 5), Value::None);
  assert_eq!(heap.object_field(object + 1, 0), Value::None);
  assert_eq!(heap.object_field_count(object + 1), None);
}

#[test]
fn swept_object_slots_are_reused() {
  let mut heap = Heap::default();
  let a = heap.alloc_object(1);
  let b = heap.alloc_object(1);
  heap.set_object_field(b, 0, Value::Int(7));
  heap.collect([Value::Object(b)].into_iter());

  assert!(!heap.object_is_live(a));
  assert_eq!(heap.object_field(a, 0), Value::None);

  let c = heap.alloc_object(2);
  assert_eq!(c, a);
  assert!(heap.object_is_live(c));
  // the survivor kept its contents
  assert_eq!(heap.object_field(b, 0), Value::Int(7));
}

#[test]
fn marks_propagate_through_object_graphs() {
  let mut heap = Heap::default();
  let s1 = string(&mut heap, "inner");
  let s2 = string(&mut heap, "outer");
  let inner = heap.alloc_object(1);
  heap.set_object_field(inner, 0, Value::Str(s1));
  let outer = heap.alloc_object(2);
  heap.set_object_field(outer, 0, Value::Str(s2));
  heap.set_object_field(outer, 1, Value::Object(inner));

  heap.collect([Value::Object(outer)].into_iter());

  assert!(heap.object_is_live(outer));
  assert!(heap.object_is_live(inner));
  assert_eq!(heap.string(s1), Some("inner"));
  assert_eq!(heap.string(s2), Some("outer"));
}

#[test]
fn cycles_do_not_hang_or_leak() {
  let mut heap = Heap::default();
  let a = heap.alloc_object(1);
  let b = heap.alloc_object(1);
  heap.set_object_field(a, 0, Value::Object(b));
  heap.set_object_field(b, 0, Value::Object(a));

  heap.collect([Value::Object(a)].into_iter());
  assert!(heap.object_is_live(a));
  assert!(heap.object_is_live(b));

  heap.collect(std::iter::empty());
  assert!(!heap.object_is_live(a));
  assert!(!heap.object_is_live(b));
}

#[test]
fn unrooted_items_are_swept() {
  let mut heap = Heap::default();
  let s = string(&mut heap, "gone");
  let object = heap.alloc_object(1);
  heap.set_object_field(object, 0, Value::Str(s));

  heap.collect(std::iter::empty());

  assert_eq!(heap.string(s), None);
  assert!(!heap.object_is_live(object));
  assert_eq!(heap.live_strings(), 0);
}

#[test]
fn non_heap_roots_are_ignored() {
  let mut heap = Heap::default();
  let s = string(&mut heap, "kept");
  heap.collect([Value::None, Value::Int(3), Value::Double(0.5), Value::Str(s)].into_iter());
  assert_eq!(heap.string(s), Some("kept"));
}
