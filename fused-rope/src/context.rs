use digit_layout::DigitLayout;
use std::ops::Deref;
use vm::{Id, ObjId, StackTracer, Tensor, VirtualMachine, device_id, n_bytes, pid};

/// 调用上下文，把算子启动归属到进程中的具体调用点。
pub struct Context<'vm, VM: ?Sized> {
    stack: StackTracer,
    vm: &'vm VM,
}

pub trait VirtualMachineExt: VirtualMachine {
    /// 在进程 `pid` 的设备 `dev` 上创建调用上下文。
    fn context(&self, pid: pid, dev: device_id) -> Context<'_, Self> {
        Context {
            stack: StackTracer::new(pid, dev),
            vm: self,
        }
    }

    /// 分配不属于任何进程的连续张量。
    fn workspace<'vm>(&'vm self, dt: DigitLayout, shape: &[usize]) -> Tensor<'vm, Self> {
        let blob = self.alloc(ObjId::global(), n_bytes(dt, shape));
        Tensor::new(dt, shape, blob, self)
    }
}

impl<VM: VirtualMachine + ?Sized> VirtualMachineExt for VM {}

impl<'vm, VM: ?Sized> Context<'vm, VM> {
    pub fn stack(&self) -> ObjId {
        self.stack.path()
    }

    pub fn vm(&self) -> &'vm VM {
        self.vm
    }

    /// 在子调用点 `id` 中执行 `f`。
    pub fn trap<T>(&mut self, id: impl Id, f: impl FnOnce(&mut Self) -> T) -> T {
        self.stack.push(id);
        let ans = f(self);
        self.stack.pop();
        ans
    }
}

impl<'vm, VM: VirtualMachine + ?Sized> Context<'vm, VM> {
    pub fn workspace(&self, dt: DigitLayout, shape: &[usize]) -> Tensor<'vm, VM> {
        let blob = self.vm.alloc(self.stack.path(), n_bytes(dt, shape));
        Tensor::new(dt, shape, blob, self.vm)
    }

    /// 把主机数据映射为当前调用点下名为 `which` 的对象。
    pub fn map_host(
        &self,
        which: impl Id,
        dt: DigitLayout,
        shape: &[usize],
        data: Box<dyn Deref<Target = [u8]>>,
    ) -> Tensor<'vm, VM> {
        let blob = self.vm.map_host(self.stack.obj(which), data);
        Tensor::new(dt, shape, blob, self.vm)
    }

    /// 取出之前映射的对象。
    pub fn get_mapped(
        &self,
        which: impl Id,
        dt: DigitLayout,
        shape: &[usize],
    ) -> Option<Tensor<'vm, VM>> {
        self.vm
            .get_mapped(self.stack.obj(which))
            .map(|blob| Tensor::new(dt, shape, blob, self.vm))
    }
}
