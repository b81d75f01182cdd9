// SmartMap property tests.
//
// Model: a Vec of optional per-map `HashMap<String, i64>` plus, for every
// outstanding handle, the model map it should resolve through (or None
// once detached) and its key.
//
// Invariants checked after every step:
// - `is_attached()` matches the model's map assignment for each handle.
// - Attached handles read the model's value for their (map, key).
// - Detached handles fail with `Error::DetachedHandle`.
//
// Operations: lookup, write through a handle, clone/drop a handle,
// `mem::take` a handle, clone/clone_from a map, take/assign_from a map,
// drop a map.
use proptest::prelude::*;
use smart_map::{Error, Handle, SmartMap, Store};
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum Op {
    Lookup(usize, u8),
    Write(usize, i64),
    CloneHandle(usize),
    TakeHandle(usize),
    DropHandle(usize),
    CloneMap(usize),
    CloneFrom(usize, usize),
    TakeMap(usize),
    AssignFrom(usize, usize),
    DropMap(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), 0u8..6).prop_map(|(m, k)| Op::Lookup(m, k)),
        4 => (any::<usize>(), any::<i64>()).prop_map(|(h, v)| Op::Write(h, v)),
        1 => any::<usize>().prop_map(Op::CloneHandle),
        1 => any::<usize>().prop_map(Op::TakeHandle),
        1 => any::<usize>().prop_map(Op::DropHandle),
        1 => any::<usize>().prop_map(Op::CloneMap),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::CloneFrom(a, b)),
        1 => any::<usize>().prop_map(Op::TakeMap),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::AssignFrom(a, b)),
        1 => any::<usize>().prop_map(Op::DropMap),
    ]
}

struct Tracked {
    handle: Handle<i64>,
    map: Option<usize>,
    key: String,
}

struct World {
    maps: Vec<Option<(SmartMap, HashMap<String, i64>)>>,
    handles: Vec<Tracked>,
}

impl World {
    fn pick_map(&self, raw: usize) -> Option<usize> {
        let live: Vec<usize> = (0..self.maps.len())
            .filter(|&i| self.maps[i].is_some())
            .collect();
        if live.is_empty() {
            None
        } else {
            Some(live[raw % live.len()])
        }
    }

    fn pick_handle(&self, raw: usize) -> Option<usize> {
        if self.handles.is_empty() {
            None
        } else {
            Some(raw % self.handles.len())
        }
    }

    fn detach_all(&mut self, m: usize) {
        for t in &mut self.handles {
            if t.map == Some(m) {
                t.map = None;
            }
        }
    }

    fn retarget_all(&mut self, from: usize, to: usize) {
        for t in &mut self.handles {
            if t.map == Some(from) {
                t.map = Some(to);
            }
        }
    }

    fn pair_mut(&mut self, a: usize, b: usize) -> (&mut SmartMap, &mut SmartMap) {
        assert_ne!(a, b);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.maps.split_at_mut(hi);
        let lo_map = &mut left[lo].as_mut().unwrap().0;
        let hi_map = &mut right[0].as_mut().unwrap().0;
        if a < b {
            (lo_map, hi_map)
        } else {
            (hi_map, lo_map)
        }
    }
}

proptest! {
    #[test]
    fn prop_handles_track_model(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let store = Store::new();
        let mut w = World {
            maps: vec![Some((SmartMap::with_store(&store), HashMap::new()))],
            handles: Vec::new(),
        };

        for op in ops {
            match op {
                Op::Lookup(m, k) => {
                    if let Some(m) = w.pick_map(m) {
                        let key = format!("k{k}");
                        let (map, model) = w.maps[m].as_mut().unwrap();
                        let handle = map.lookup::<i64, str>(&key);
                        model.entry(key.clone()).or_insert(0);
                        w.handles.push(Tracked { handle, map: Some(m), key });
                    }
                }
                Op::Write(h, v) => {
                    if let Some(h) = w.pick_handle(h) {
                        let t = &w.handles[h];
                        match t.map {
                            Some(m) => {
                                prop_assert!(t.handle.replace(v).is_ok());
                                let model = &mut w.maps[m].as_mut().unwrap().1;
                                model.insert(t.key.clone(), v);
                            }
                            None => prop_assert_eq!(t.handle.replace(v), Err(Error::DetachedHandle)),
                        }
                    }
                }
                Op::CloneHandle(h) => {
                    if let Some(h) = w.pick_handle(h) {
                        let t = &w.handles[h];
                        let cloned = Tracked { handle: t.handle.clone(), map: t.map, key: t.key.clone() };
                        w.handles.push(cloned);
                    }
                }
                Op::TakeHandle(h) => {
                    if let Some(h) = w.pick_handle(h) {
                        let handle = std::mem::take(&mut w.handles[h].handle);
                        let map = w.handles[h].map.take();
                        let key = w.handles[h].key.clone();
                        w.handles.push(Tracked { handle, map, key });
                    }
                }
                Op::DropHandle(h) => {
                    if let Some(h) = w.pick_handle(h) {
                        w.handles.swap_remove(h);
                    }
                }
                Op::CloneMap(m) => {
                    if let Some(m) = w.pick_map(m) {
                        let (map, model) = w.maps[m].as_ref().unwrap();
                        let copy = (map.clone(), model.clone());
                        w.maps.push(Some(copy));
                    }
                }
                Op::CloneFrom(a, b) => {
                    if let (Some(a), Some(b)) = (w.pick_map(a), w.pick_map(b)) {
                        if a != b {
                            let (dst, src) = w.pair_mut(a, b);
                            dst.clone_from(src);
                            let model = w.maps[b].as_ref().unwrap().1.clone();
                            w.maps[a].as_mut().unwrap().1 = model;
                            w.detach_all(a);
                        }
                    }
                }
                Op::TakeMap(m) => {
                    if let Some(m) = w.pick_map(m) {
                        let (map, model) = w.maps[m].as_mut().unwrap();
                        let moved = (map.take(), std::mem::take(model));
                        w.maps.push(Some(moved));
                        let to = w.maps.len() - 1;
                        w.retarget_all(m, to);
                    }
                }
                Op::AssignFrom(a, b) => {
                    if let (Some(a), Some(b)) = (w.pick_map(a), w.pick_map(b)) {
                        if a != b {
                            let (dst, src) = w.pair_mut(a, b);
                            dst.assign_from(src);
                            let model = std::mem::take(&mut w.maps[b].as_mut().unwrap().1);
                            w.maps[a].as_mut().unwrap().1 = model;
                            w.detach_all(a);
                            w.retarget_all(b, a);
                        }
                    }
                }
                Op::DropMap(m) => {
                    if let Some(m) = w.pick_map(m) {
                        w.maps[m] = None;
                        w.detach_all(m);
                    }
                }
            }

            for t in &w.handles {
                prop_assert_eq!(t.handle.is_attached(), t.map.is_some());
                match t.map {
                    Some(m) => {
                        let (map, model) = w.maps[m].as_ref().unwrap();
                        prop_assert_eq!(t.handle.container(), Some(map.id()));
                        let got = *t.handle.get().unwrap();
                        prop_assert_eq!(Some(&got), model.get(&t.key));
                    }
                    None => prop_assert_eq!(t.handle.get().err(), Some(Error::DetachedHandle)),
                }
            }
        }
    }
}

// Growth never disturbs values read through earlier handles, whatever the
// interleaving of new keys and writes.
proptest! {
    #[test]
    fn prop_growth_preserves_values(writes in proptest::collection::vec((0u16..400, any::<u32>()), 1..300)) {
        let mut map = SmartMap::with_store(&Store::new());
        let mut handles: HashMap<u16, Handle<u32>> = HashMap::new();
        let mut model: HashMap<u16, u32> = HashMap::new();
        for (k, v) in writes {
            let h = handles
                .entry(k)
                .or_insert_with(|| map.lookup::<u32, u16>(&k));
            h.replace(v).unwrap();
            model.insert(k, v);
            for (k, h) in &handles {
                prop_assert_eq!(*h.get().unwrap(), model[k]);
            }
        }
    }
}
