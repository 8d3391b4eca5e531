mod op;

use digit_layout::DigitLayout;
use patricia_tree::PatriciaMap;
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Mutex, MutexGuard},
};
use tracing::trace;
use vm::{ObjId, Tensor, VirtualMachine, pid};

/// 用于测试的虚拟系统，记录每次算子启动而不执行计算。
#[derive(Default)]
#[repr(transparent)]
pub struct TestVM(Mutex<Internal>);

pub struct Blob {
    id: usize,
    n_bytes: usize,
}

impl Blob {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl vm::Blob for Blob {
    fn eq(l: &Self, r: &Self) -> bool {
        l.id == r.id
    }

    fn n_bytes(&self) -> usize {
        self.n_bytes
    }
}

/// 注入的算子故障。
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("kernel fault in {op}: {reason}")]
pub struct Fault {
    pub op: &'static str,
    pub reason: String,
}

/// 一次算子启动的记录。
#[derive(Clone, Debug)]
pub struct Launch {
    pub op: &'static str,
    pub stack: ObjId,
    pub info: String,
}

#[derive(Default)]
struct Internal {
    next_pid: pid,
    next_blob_id: usize,
    maps: PatriciaMap<usize>,
    bcbs: HashMap<usize, Bcb>,
    launches: Vec<Launch>,
    fault: Option<String>,
}

/// Bcb for Blob Control Block
struct Bcb {
    id: usize,
    n_bytes: usize,
    obj: ObjId,
    rc: usize,
}

impl VirtualMachine for TestVM {
    type Blob = Blob;
    type Error = Fault;

    fn register(&self, arch: &str) -> pid {
        let mut internal = self.internal();
        let pid = internal.next_pid;
        internal.next_pid += 1;
        trace!("[vm:_] register {arch} -> #{pid:x}");
        pid
    }

    fn unregister(&self, pid: pid) {
        trace!("[vm:_] unregister #{pid:x}")
    }

    fn map_host(&self, obj: ObjId, mem: Box<dyn Deref<Target = [u8]>>) -> Self::Blob {
        self.alloc_(obj, mem.len())
    }

    fn get_mapped(&self, obj: ObjId) -> Option<Self::Blob> {
        let mut internal = self.internal();
        let Internal { maps, bcbs, .. } = &mut *internal;

        let id = *maps.get(&obj)?;
        trace!("{} load %{id} @ {}", obj.domain(), obj.body());

        let bcb = bcbs.get_mut(&id)?;
        bcb.rc += 1;
        Some(Blob {
            id: bcb.id,
            n_bytes: bcb.n_bytes,
        })
    }

    fn alloc(&self, obj: ObjId, size: usize) -> Self::Blob {
        self.alloc_(obj, size)
    }

    fn free(&self, blob: Self::Blob) {
        let mut internal = self.internal();
        let Internal { maps, bcbs, .. } = &mut *internal;

        let bcb = bcbs.get_mut(&blob.id).unwrap();
        bcb.rc -= 1;
        if bcb.rc == 0 {
            trace!("{} free %{}", bcb.obj.domain(), bcb.id);
            if !maps.contains_key(&bcb.obj) {
                bcbs.remove(&blob.id);
            }
        }
    }
}

impl TestVM {
    fn internal(&self) -> MutexGuard<'_, Internal> {
        self.0.lock().unwrap()
    }

    /// 让下一次算子启动失败。
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.internal().fault = Some(reason.into())
    }

    /// 按启动顺序返回所有记录。
    pub fn launches(&self) -> Vec<Launch> {
        self.internal().launches.clone()
    }

    /// 仍被引用的存储数量。
    pub fn n_live_blobs(&self) -> usize {
        self.internal().bcbs.values().filter(|bcb| bcb.rc > 0).count()
    }

    fn launch(&self, op: &'static str, stack: ObjId, info: String) -> Result<(), Fault> {
        let mut internal = self.internal();
        if let Some(reason) = internal.fault.take() {
            trace!("{} {op} failed: {reason} @ {}", stack.domain(), stack.body());
            return Err(Fault { op, reason });
        }
        trace!("{} {info} @ {}", stack.domain(), stack.body());
        internal.launches.push(Launch { op, stack, info });
        Ok(())
    }

    fn alloc_tensor(&self, stack: &ObjId, dt: DigitLayout, shape: &[usize]) -> Tensor<'_, Self> {
        let blob = self.alloc_(stack.clone(), vm::n_bytes(dt, shape));
        Tensor::new(dt, shape, blob, self)
    }

    fn alloc_(&self, obj: ObjId, size: usize) -> Blob {
        let mut internal = self.internal();

        let id = internal.next_blob_id;
        internal.next_blob_id += 1;

        trace!("{} alloc %{id} {size} bytes @ {}", obj.domain(), obj.body());

        if obj.is_obj() {
            assert!(internal.maps.insert(&obj, id).is_none())
        }

        let bcb = Bcb {
            id,
            obj,
            n_bytes: size,
            rc: 1,
        };
        internal.bcbs.insert(id, bcb);
        Blob { id, n_bytes: size }
    }
}

/// 以 `%id[shape]` 的形式描述张量参数。
fn arg(t: &Tensor<'_, TestVM>) -> String {
    format!("%{}{:?}", t.blob().id(), t.shape())
}

pub fn test_data(dt: DigitLayout, shape: &[usize]) -> Box<dyn Deref<Target = [u8]>> {
    Box::new(vec![0u8; vm::n_bytes(dt, shape)])
}

/// 把主机上的 `f32` 表转换为可映射的字节。
pub fn host_data(data: &[f32]) -> Box<dyn Deref<Target = [u8]>> {
    Box::new(data.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<_>>())
}
